use std::collections::BTreeSet;

use report_core::model::{Context, ContextId, ContextLevel, GroupId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, context_id_from_i64, id_i64, map_context_row, ser, user_id_from_i64};
use crate::repository::{CourseStructure, EnrolmentDirectory, StorageError};

impl SqliteRepository {
    /// Insert or replace a context row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    pub async fn upsert_context(&self, context: &Context) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO contexts (id, level, parent_id, path)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                level = excluded.level,
                parent_id = excluded.parent_id,
                path = excluded.path
            ",
        )
        .bind(id_i64("context_id", context.id().value())?)
        .bind(context.level().as_str())
        .bind(
            context
                .parent()
                .map(|p| id_i64("parent_id", p.value()))
                .transpose()?,
        )
        .bind(context.path().as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    pub async fn enrol(&self, course: ContextId, user: UserId) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO enrolments (course_id, user_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
        )
        .bind(id_i64("course_id", course.value())?)
        .bind(id_i64("user_id", user.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    pub async fn add_group_member(&self, group: GroupId, user: UserId) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
        )
        .bind(id_i64("group_id", group.value())?)
        .bind(id_i64("user_id", user.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// Closest course at or above `start`, walking parent links.
    async fn course_at_or_above(&self, start: i64) -> Result<Option<ContextId>, StorageError> {
        let row = sqlx::query(
            r"
            WITH RECURSIVE ancestors(id, level, parent_id, depth) AS (
                SELECT id, level, parent_id, 0 FROM contexts WHERE id = ?1
                UNION ALL
                SELECT c.id, c.level, c.parent_id, a.depth + 1
                FROM contexts c JOIN ancestors a ON c.id = a.parent_id
            )
            SELECT id FROM ancestors
            WHERE level = ?2
            ORDER BY depth ASC
            LIMIT 1
            ",
        )
        .bind(start)
        .bind(ContextLevel::Course.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|r| context_id_from_i64(r.try_get::<i64, _>("id").map_err(ser)?))
            .transpose()
    }
}

#[async_trait::async_trait]
impl CourseStructure for SqliteRepository {
    async fn get_context(&self, id: ContextId) -> Result<Context, StorageError> {
        let row = sqlx::query("SELECT id, level, parent_id, path FROM contexts WHERE id = ?1")
            .bind(id_i64("context_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => map_context_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn parent_course(&self, activity: ContextId) -> Result<ContextId, StorageError> {
        let parent = self
            .get_context(activity)
            .await?
            .parent()
            .ok_or(StorageError::NotFound)?;
        self.course_at_or_above(id_i64("context_id", parent.value())?)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn list_activity_contexts(
        &self,
        course: ContextId,
    ) -> Result<BTreeSet<ContextId>, StorageError> {
        let root = self.get_context(course).await?;
        let rows = sqlx::query(
            r"
            SELECT id FROM contexts
            WHERE level = ?1 AND path LIKE ?2
            ORDER BY id ASC
            ",
        )
        .bind(ContextLevel::Activity.as_str())
        .bind(format!("{}/%", root.path()))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = BTreeSet::new();
        for row in rows {
            out.insert(context_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl EnrolmentDirectory for SqliteRepository {
    async fn enrolled_users(
        &self,
        context: ContextId,
        group: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, StorageError> {
        let course = self
            .course_at_or_above(id_i64("context_id", context.value())?)
            .await?
            .ok_or(StorageError::NotFound)?;
        let course = id_i64("course_id", course.value())?;

        let rows = match group {
            None => {
                sqlx::query("SELECT user_id FROM enrolments WHERE course_id = ?1")
                    .bind(course)
                    .fetch_all(&self.pool)
                    .await
            }
            Some(group) => {
                sqlx::query(
                    r"
                    SELECT e.user_id FROM enrolments e
                    JOIN group_members g ON g.user_id = e.user_id
                    WHERE e.course_id = ?1 AND g.group_id = ?2
                    ",
                )
                .bind(course)
                .bind(id_i64("group_id", group.value())?)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(conn)?;

        let mut users = BTreeSet::new();
        for row in rows {
            users.insert(user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?);
        }
        Ok(users)
    }
}
