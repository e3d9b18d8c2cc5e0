use report_core::model::{ContextId, CourseAttemptEntry, StoredEntry};
use sqlx::Row;
use tracing::warn;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{AttemptCacheStore, StorageError};

impl SqliteRepository {
    /// Write a raw cache payload, bypassing serialization of the current shape.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    pub async fn put_raw_payload(&self, course: ContextId, payload: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO attempt_cache (course_id, payload)
            VALUES (?1, ?2)
            ON CONFLICT(course_id) DO UPDATE SET payload = excluded.payload
            ",
        )
        .bind(id_i64("course_id", course.value())?)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AttemptCacheStore for SqliteRepository {
    async fn get_entry(&self, course: ContextId) -> Result<Option<StoredEntry>, StorageError> {
        let row = sqlx::query("SELECT payload FROM attempt_cache WHERE course_id = ?1")
            .bind(id_i64("course_id", course.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload").map_err(ser)?;
        match serde_json::from_str::<StoredEntry>(&payload) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Unreadable payloads behave like a miss and get rebuilt.
                warn!(course = %course, error = %e, "discarding unreadable attempt cache entry");
                Ok(None)
            }
        }
    }

    async fn set_entry(
        &self,
        course: ContextId,
        entry: &CourseAttemptEntry,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(entry).map_err(ser)?;
        self.put_raw_payload(course, &payload).await
    }

    async fn delete_entry(&self, course: ContextId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM attempt_cache WHERE course_id = ?1")
            .bind(id_i64("course_id", course.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
