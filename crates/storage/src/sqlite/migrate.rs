use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Version 1: context tree, enrolments, attempts, question steps, the attempt
/// cache and user preferences.
const V1_STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS contexts (
        id INTEGER PRIMARY KEY,
        level TEXT NOT NULL,
        parent_id INTEGER,
        path TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS enrolments (
        course_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        PRIMARY KEY (course_id, user_id),
        FOREIGN KEY (course_id) REFERENCES contexts(id) ON DELETE CASCADE
    )",
    r"
    CREATE TABLE IF NOT EXISTS group_members (
        group_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY,
        context_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        embed_id TEXT NOT NULL,
        usage_id INTEGER NOT NULL UNIQUE,
        page_url TEXT NOT NULL,
        page_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        modified_at TEXT NOT NULL,
        UNIQUE (user_id, context_id, embed_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS question_steps (
        id INTEGER PRIMARY KEY,
        usage_id INTEGER NOT NULL,
        slot INTEGER NOT NULL CHECK (slot >= 0),
        question_attempt_id INTEGER NOT NULL,
        sequence_number INTEGER NOT NULL CHECK (sequence_number >= 0),
        state TEXT NOT NULL,
        fraction REAL,
        user_id INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS attempt_cache (
        course_id INTEGER PRIMARY KEY,
        payload TEXT NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS user_preferences (
        user_id INTEGER PRIMARY KEY,
        page_size INTEGER NOT NULL CHECK (page_size BETWEEN 1 AND 999)
    )",
    "CREATE INDEX IF NOT EXISTS idx_contexts_path ON contexts(path)",
    "CREATE INDEX IF NOT EXISTS idx_attempts_context_user ON attempts(context_id, user_id)",
    r"
    CREATE INDEX IF NOT EXISTS idx_question_steps_usage_slot_seq
        ON question_steps(usage_id, slot, sequence_number)",
];

/// Ordered schema versions; each runs once inside its own transaction.
const MIGRATIONS: &[(i64, &[&str])] = &[(1, V1_STATEMENTS)];

/// Applies every schema version not yet recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    for (version, statements) in MIGRATIONS {
        if is_applied(pool, *version).await? {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in statements.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)
             ON CONFLICT(version) DO NOTHING",
        )
        .bind(*version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
        .bind(version)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}
