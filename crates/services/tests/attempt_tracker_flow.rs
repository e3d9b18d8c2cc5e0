use chrono::{Duration, NaiveDate};
use report_core::config::ReportDefaults;
use report_core::model::{
    Context, ContextId, ContextLevel, ContextPath, CourseAttemptEntry, DisplayOptionsSource,
    EmbedLocation, FilterForm, NewAttempt, QuestionAttemptId, QuestionStep, ReportScope, StepId,
    StepState, StoredEntry, UrlParams, UsageId, UserId,
};
use report_core::report::{HistoryColumn, LatestColumn, SortKey};
use report_core::time::{fixed_now, start_of_day};
use services::{Clock, ReportServices};
use storage::repository::{
    AttemptCacheStore, AttemptRepository, InMemoryRepository, QuestionStepRepository, Storage,
};
use storage::sqlite::SqliteRepository;

const COURSE: u64 = 3;
const QUIZ: u64 = 15;

fn path(ids: &[u64]) -> ContextPath {
    let ids: Vec<_> = ids.iter().copied().map(ContextId::new).collect();
    ContextPath::from_ids(&ids).unwrap()
}

fn course_contexts(activities: &[u64]) -> Vec<Context> {
    let mut contexts = vec![Context::new(
        ContextId::new(COURSE),
        ContextLevel::Course,
        None,
        path(&[COURSE]),
    )];
    for activity in activities {
        contexts.push(Context::new(
            ContextId::new(*activity),
            ContextLevel::Activity,
            Some(ContextId::new(COURSE)),
            path(&[COURSE, *activity]),
        ));
    }
    contexts
}

fn memory_course(activities: &[u64]) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    for context in course_contexts(activities) {
        repo.add_context(context).unwrap();
    }
    repo
}

fn services(repo: &InMemoryRepository) -> ReportServices {
    ReportServices::from_storage(
        &Storage::from_memory(repo),
        Clock::fixed(fixed_now()),
        ReportDefaults::default(),
    )
}

fn interaction(context: u64, user: u64, usage: u64) -> NewAttempt {
    NewAttempt {
        context_id: ContextId::new(context),
        user_id: UserId::new(user),
        embed: EmbedLocation::new(format!("question{usage}/embed")).unwrap(),
        usage_id: UsageId::new(usage),
        page_url: format!("https://lms.example/mod/page/view.php?id={context}"),
        page_name: "Embedded practice".into(),
        created_at: fixed_now(),
    }
}

fn step(
    id: u64,
    usage: u64,
    qa: u64,
    seq: u32,
    state: StepState,
    at: chrono::DateTime<chrono::Utc>,
) -> QuestionStep {
    QuestionStep {
        id: StepId::new(id),
        usage_id: UsageId::new(usage),
        slot: 1,
        question_attempt_id: QuestionAttemptId::new(qa),
        sequence_number: seq,
        state,
        fraction: None,
        user_id: UserId::new(5),
        created_at: at,
    }
}

async fn course_entry(app: &ReportServices) -> CourseAttemptEntry {
    app.tracker()
        .cached_entry(ContextId::new(COURSE))
        .await
        .unwrap()
        .expect("course entry cached")
}

async fn assert_end_to_end(app: &ReportServices) {
    let tracker = app.tracker();
    let course = ContextId::new(COURSE);
    let quiz = ContextId::new(QUIZ);

    assert!(!tracker.has_attempt(course).await.unwrap());
    let empty = course_entry(app).await;
    assert!(!empty.value);
    assert_eq!(empty.subcontext.len(), 1);
    assert_eq!(empty.activity(quiz), Some(false));

    app.attempts()
        .record_attempt(interaction(QUIZ, 5, 100))
        .await
        .unwrap();
    tracker.on_attempts_changed(quiz).await.unwrap();

    assert!(tracker.has_attempt(course).await.unwrap());
    assert!(tracker.has_attempt(quiz).await.unwrap());
    assert!(!course_entry(app).await.value);
}

#[tokio::test]
async fn end_to_end_scenario_in_memory() {
    let repo = memory_course(&[QUIZ]);
    assert_end_to_end(&services(&repo)).await;
}

#[tokio::test]
async fn end_to_end_scenario_on_sqlite() {
    let url = "sqlite:file:services_end_to_end?mode=memory&cache=shared";
    let repo = SqliteRepository::connect(url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    for context in course_contexts(&[QUIZ]) {
        repo.upsert_context(&context).await.unwrap();
    }

    let app = ReportServices::from_storage(
        &Storage::from_sqlite(&repo),
        Clock::fixed(fixed_now()),
        ReportDefaults::default(),
    );
    assert_end_to_end(&app).await;
}

#[tokio::test]
async fn deleting_the_only_attempt_clears_the_activity_flag() {
    let repo = memory_course(&[QUIZ, 16]);
    let app = services(&repo);
    app.attempts()
        .record_attempt(interaction(QUIZ, 5, 100))
        .await
        .unwrap();
    assert!(app.tracker().has_attempt(ContextId::new(QUIZ)).await.unwrap());

    let touched = app.attempts().delete_by_usage(UsageId::new(100)).await.unwrap();
    assert_eq!(touched, vec![ContextId::new(QUIZ)]);

    let entry = course_entry(&app).await;
    assert_eq!(entry.activity(ContextId::new(QUIZ)), Some(false));
    assert_eq!(entry.activity(ContextId::new(16)), Some(false));
    assert!(!app.tracker().has_attempt(ContextId::new(COURSE)).await.unwrap());
}

#[tokio::test]
async fn activity_added_after_build_is_checked_live() {
    let repo = memory_course(&[QUIZ]);
    let app = services(&repo);
    app.tracker()
        .rebuild_course(ContextId::new(COURSE))
        .await
        .unwrap();

    repo.add_context(Context::new(
        ContextId::new(16),
        ContextLevel::Activity,
        Some(ContextId::new(COURSE)),
        path(&[COURSE, 16]),
    ))
    .unwrap();
    // Inserted straight into the store: no change notification reaches the tracker.
    repo.insert_attempt(interaction(16, 6, 200)).await.unwrap();

    assert!(app.tracker().has_attempt(ContextId::new(16)).await.unwrap());
    assert_eq!(
        course_entry(&app).await.activity(ContextId::new(16)),
        Some(true)
    );
}

#[tokio::test]
async fn legacy_entry_is_replaced_on_first_read() {
    let repo = memory_course(&[QUIZ]);
    repo.put_raw_entry(ContextId::new(COURSE), StoredEntry::Legacy { value: false })
        .unwrap();
    let app = services(&repo);

    assert!(!app.tracker().has_attempt(ContextId::new(QUIZ)).await.unwrap());
    let stored = repo.get_entry(ContextId::new(COURSE)).await.unwrap();
    assert!(matches!(stored, Some(StoredEntry::Valid(_))));
}

#[tokio::test]
async fn filter_form_flows_into_latest_and_history_reports() {
    let repo = memory_course(&[QUIZ, 16]);
    for user in [5, 6] {
        repo.enrol(ContextId::new(COURSE), UserId::new(user)).unwrap();
    }
    let app = services(&repo);

    let day = NaiveDate::from_ymd_opt(2023, 11, 10).unwrap();
    let t = start_of_day(day);
    app.attempts()
        .record_attempt(interaction(QUIZ, 5, 100))
        .await
        .unwrap();
    app.attempts()
        .record_attempt(interaction(16, 6, 200))
        .await
        .unwrap();
    let steps = [
        step(1, 100, 10, 0, StepState::NotStarted, t),
        step(2, 100, 10, 1, StepState::GradedWrong, t + Duration::hours(2)),
        step(3, 100, 11, 2, StepState::NotStarted, t + Duration::hours(3)),
        step(
            4,
            100,
            11,
            3,
            StepState::GradedRight,
            t + Duration::hours(23) + Duration::minutes(59),
        ),
        step(5, 200, 20, 0, StepState::Complete, t + Duration::hours(25)),
    ];
    for s in &steps {
        repo.append_step(s).await.unwrap();
    }

    let scope = ReportScope::Course(ContextId::new(COURSE));
    let form = FilterForm {
        date_to: Some(day),
        page_size: "20".into(),
        location_ids: vec![ContextId::new(QUIZ), ContextId::new(16)],
        ..FilterForm::default()
    };
    let options = app
        .display_options()
        .resolve(UserId::new(2), scope, &DisplayOptionsSource::Form(form))
        .await
        .unwrap();

    let latest = app
        .reports()
        .latest_page(&options, vec![SortKey::asc(LatestColumn::User)], 0)
        .await
        .unwrap();
    assert_eq!(latest.total, 1);
    assert_eq!(latest.rows[0].step_id, StepId::new(4));
    assert_eq!(latest.page_size.value(), 20);

    let focused = app
        .display_options()
        .resolve(
            UserId::new(2),
            scope,
            &DisplayOptionsSource::Url(UrlParams::from_pairs([
                ("userid", "5"),
                ("usageid", "100"),
            ])),
        )
        .await
        .unwrap();
    assert_eq!(focused.page_size().value(), 20);
    assert_eq!(focused.user(), Some(UserId::new(5)));

    let history = app
        .reports()
        .history_page(&focused, vec![SortKey::asc(HistoryColumn::Time)], 0)
        .await
        .unwrap();
    let numbered: Vec<(u64, u32)> = history
        .rows
        .iter()
        .map(|row| (row.step_id.value(), row.attempt_number))
        .collect();
    assert_eq!(numbered, vec![(2, 1), (4, 2)]);
}
