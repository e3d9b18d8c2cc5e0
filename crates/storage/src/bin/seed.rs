use std::fmt;

use chrono::{DateTime, Duration, Utc};
use report_core::model::{
    Context, ContextId, ContextLevel, ContextPath, EmbedLocation, NewAttempt, QuestionAttemptId,
    QuestionStep, StepId, StepState, UsageId, UserId,
};
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYSTEM_CONTEXT: u64 = 1;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: ContextId,
    activities: u32,
    users: u32,
    attempts: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCourseId { raw: String },
    InvalidActivities { raw: String },
    InvalidUsers { raw: String },
    InvalidAttempts { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
            ArgsError::InvalidActivities { raw } => write!(f, "invalid --activities value: {raw}"),
            ArgsError::InvalidUsers { raw } => write!(f, "invalid --users value: {raw}"),
            ArgsError::InvalidAttempts { raw } => write!(f, "invalid --attempts value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("REPORT_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_id = std::env::var("REPORT_COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| ContextId::new(2), ContextId::new);
        let mut activities = env_u32("REPORT_ACTIVITIES", 3);
        let mut users = env_u32("REPORT_USERS", 4);
        let mut attempts = env_u32("REPORT_ATTEMPTS", 2);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                    if parsed <= SYSTEM_CONTEXT {
                        return Err(ArgsError::InvalidCourseId { raw: value });
                    }
                    course_id = ContextId::new(parsed);
                }
                "--activities" => {
                    let value = require_value(&mut args, "--activities")?;
                    activities = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidActivities { raw: value.clone() })?;
                }
                "--users" => {
                    let value = require_value(&mut args, "--users")?;
                    users = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidUsers { raw: value.clone() })?;
                }
                "--attempts" => {
                    let value = require_value(&mut args, "--attempts")?;
                    attempts = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidAttempts { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            activities,
            users,
            attempts,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-id <id>          Course context id, above 1 (default: 2)");
    eprintln!("  --activities <n>          Activity contexts under the course (default: 3)");
    eprintln!("  --users <n>               Enrolled learners (default: 4)");
    eprintln!("  --attempts <n>            Question attempts per learner and activity (default: 2)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  REPORT_DB_URL, REPORT_COURSE_ID, REPORT_ACTIVITIES, REPORT_USERS, REPORT_ATTEMPTS"
    );
}

fn context(id: u64, level: ContextLevel, parent: Option<ContextId>, path: ContextPath) -> Context {
    Context::new(ContextId::new(id), level, parent, path)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    let storage = Storage::from_sqlite(&repo);
    let now = args.now.unwrap_or_else(Utc::now);

    let system_path = ContextPath::from_ids(&[ContextId::new(SYSTEM_CONTEXT)])?;
    repo.upsert_context(&context(
        SYSTEM_CONTEXT,
        ContextLevel::System,
        None,
        system_path.clone(),
    ))
    .await?;
    let course_path = system_path.child(args.course_id);
    repo.upsert_context(&Context::new(
        args.course_id,
        ContextLevel::Course,
        Some(ContextId::new(SYSTEM_CONTEXT)),
        course_path.clone(),
    ))
    .await?;

    let base = args.course_id.value() * 1000;
    let mut recorded = 0_u32;

    for a in 1..=u64::from(args.activities) {
        let activity_id = ContextId::new(base + a);
        repo.upsert_context(&Context::new(
            activity_id,
            ContextLevel::Activity,
            Some(args.course_id),
            course_path.child(activity_id),
        ))
        .await?;

        for u in 1..=u64::from(args.users) {
            let user = UserId::new(100 + u);
            repo.enrol(args.course_id, user).await?;

            let embed = EmbedLocation::new(format!("seed-q{a}/embed-{a}"))?;
            if storage
                .attempts
                .find_attempt(user, activity_id, &embed)
                .await?
                .is_some()
            {
                continue;
            }

            // Deterministic ids keep reruns with larger counts conflict-free.
            let usage_id = UsageId::new((base + a) * 1000 + u);
            let started = now - Duration::days(i64::try_from(u + a)?);
            let attempt = NewAttempt {
                context_id: activity_id,
                user_id: user,
                embed,
                usage_id,
                page_url: format!("https://lms.example/mod/page/view.php?id={}", activity_id),
                page_name: format!("Seed page {a}"),
                created_at: started,
            }
            .validate()?;
            storage.attempts.insert_attempt(attempt).await?;

            for qa in 0..u64::from(args.attempts) {
                let question_attempt_id = QuestionAttemptId::new(usage_id.value() * 10 + qa);
                for (seq, state) in [StepState::Todo, StepState::GradedRight].into_iter().enumerate() {
                    let sequence_number = u32::try_from(qa)? * 2 + u32::try_from(seq)?;
                    let step_id = usage_id.value() * 1000 + u64::from(sequence_number);
                    storage
                        .steps
                        .append_step(&QuestionStep {
                            id: StepId::new(step_id),
                            usage_id,
                            slot: 1,
                            question_attempt_id,
                            sequence_number,
                            state,
                            fraction: (state == StepState::GradedRight).then_some(1.0),
                            user_id: user,
                            created_at: started + Duration::minutes(i64::from(sequence_number)),
                        })
                        .await?;
                }
            }
            recorded += 1;
        }
    }

    storage.cache.delete_entry(args.course_id).await?;

    info!(
        course = %args.course_id,
        activities = args.activities,
        attempts = recorded,
        db = %args.db_url,
        "seeded course"
    );
    println!(
        "Seeded course {} with {} activities and {} attempts into {}",
        args.course_id, args.activities, recorded, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
