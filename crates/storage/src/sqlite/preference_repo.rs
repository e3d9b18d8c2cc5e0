use report_core::model::{PageSize, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{PreferenceRepository, StorageError};

#[async_trait::async_trait]
impl PreferenceRepository for SqliteRepository {
    async fn page_size(&self, user: UserId) -> Result<Option<PageSize>, StorageError> {
        let row = sqlx::query("SELECT page_size FROM user_preferences WHERE user_id = ?1")
            .bind(id_i64("user_id", user.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: i64 = row.try_get("page_size").map_err(ser)?;
        let size = u16::try_from(raw).map_err(ser)?;
        PageSize::new(size).map(Some).map_err(ser)
    }

    async fn set_page_size(&self, user: UserId, size: PageSize) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_preferences (user_id, page_size)
            VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET page_size = excluded.page_size
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(i64::from(size.value()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
