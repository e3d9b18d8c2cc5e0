use report_core::model::{
    Attempt, AttemptId, Context, ContextId, ContextLevel, ContextPath, EmbedLocation,
    QuestionAttemptId, QuestionStep, StepId, StepState, UsageId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn context_id_from_i64(v: i64) -> Result<ContextId, StorageError> {
    Ok(ContextId::new(i64_to_u64("context_id", v)?))
}

pub(crate) fn usage_id_from_i64(v: i64) -> Result<UsageId, StorageError> {
    Ok(UsageId::new(i64_to_u64("usage_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

/// Appends `?start, ?start+1, ...` for `count` binds.
/// Ids bound per `IN (...)` list; larger sets are queried in chunks to stay
/// under SQLite's bound-variable limit.
pub(crate) const MAX_BOUND_IDS: usize = 500;

pub(crate) fn push_placeholders(sql: &mut String, start: usize, count: usize) {
    for i in 0..count {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        sql.push_str(&(start + i).to_string());
    }
}

pub(crate) fn map_context_row(row: &SqliteRow) -> Result<Context, StorageError> {
    let level: String = row.try_get("level").map_err(ser)?;
    let path: String = row.try_get("path").map_err(ser)?;
    Ok(Context::new(
        context_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        ContextLevel::parse(&level).map_err(ser)?,
        row.try_get::<Option<i64>, _>("parent_id")
            .map_err(ser)?
            .map(context_id_from_i64)
            .transpose()?,
        ContextPath::parse(&path).map_err(ser)?,
    ))
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<Attempt, StorageError> {
    let embed: String = row.try_get("embed_id").map_err(ser)?;
    Attempt::from_persisted(
        AttemptId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        context_id_from_i64(row.try_get::<i64, _>("context_id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        EmbedLocation::new(embed).map_err(ser)?,
        usage_id_from_i64(row.try_get::<i64, _>("usage_id").map_err(ser)?)?,
        row.try_get::<String, _>("page_url").map_err(ser)?,
        row.try_get::<String, _>("page_name").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("modified_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_step_row(row: &SqliteRow) -> Result<QuestionStep, StorageError> {
    let state_str: String = row.try_get("state").map_err(ser)?;
    let state = StepState::parse(&state_str)
        .ok_or_else(|| StorageError::Serialization(format!("invalid state: {state_str}")))?;

    Ok(QuestionStep {
        id: StepId::new(i64_to_u64("step_id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        usage_id: usage_id_from_i64(row.try_get::<i64, _>("usage_id").map_err(ser)?)?,
        slot: i64_to_u32("slot", row.try_get::<i64, _>("slot").map_err(ser)?)?,
        question_attempt_id: QuestionAttemptId::new(i64_to_u64(
            "question_attempt_id",
            row.try_get::<i64, _>("question_attempt_id").map_err(ser)?,
        )?),
        sequence_number: i64_to_u32(
            "sequence_number",
            row.try_get::<i64, _>("sequence_number").map_err(ser)?,
        )?,
        state,
        fraction: row.try_get("fraction").map_err(ser)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
