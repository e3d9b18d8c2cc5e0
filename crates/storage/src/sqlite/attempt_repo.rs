use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use report_core::model::{
    Attempt, AttemptId, ContextId, EmbedLocation, NewAttempt, UsageId, UserId,
};
use report_core::report::{AttemptFilter, ContextScope};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    MAX_BOUND_IDS, conn, context_id_from_i64, id_i64, map_attempt_row, push_placeholders, ser,
    usage_id_from_i64,
};
use crate::repository::{AttemptRepository, StorageError};

const ATTEMPT_COLUMNS: &str = r"
    a.id, a.context_id, a.user_id, a.embed_id, a.usage_id,
    a.page_url, a.page_name, a.created_at, a.modified_at
";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn count_attempts(&self, context_id: ContextId) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM attempts WHERE context_id = ?1")
            .bind(id_i64("context_id", context_id.value())?)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        let n: i64 = row.try_get("n").map_err(ser)?;
        u64::try_from(n).map_err(ser)
    }

    async fn count_attempts_grouped(
        &self,
        context_ids: &BTreeSet<ContextId>,
    ) -> Result<HashMap<ContextId, u64>, StorageError> {
        let ids: Vec<ContextId> = context_ids.iter().copied().collect();
        let mut counts = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BOUND_IDS) {
            let mut sql = String::from(
                r"
                SELECT context_id, COUNT(*) AS n
                FROM attempts
                WHERE context_id IN (
                ",
            );
            push_placeholders(&mut sql, 1, chunk.len());
            sql.push_str(")\n GROUP BY context_id");

            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id_i64("context_id", id.value())?);
            }

            for row in query.fetch_all(&self.pool).await.map_err(conn)? {
                let id = context_id_from_i64(row.try_get::<i64, _>("context_id").map_err(ser)?)?;
                let n: i64 = row.try_get("n").map_err(ser)?;
                counts.insert(id, u64::try_from(n).map_err(ser)?);
            }
        }
        Ok(counts)
    }

    async fn find_attempt(
        &self,
        user_id: UserId,
        context_id: ContextId,
        embed: &EmbedLocation,
    ) -> Result<Option<Attempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts a
             WHERE a.user_id = ?1 AND a.context_id = ?2 AND a.embed_id = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(id_i64("context_id", context_id.value())?)
            .bind(embed.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn find_by_usage(&self, usage_id: UsageId) -> Result<Option<Attempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts a WHERE a.usage_id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("usage_id", usage_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO attempts (
                context_id, user_id, embed_id, usage_id, page_url, page_name,
                created_at, modified_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ",
        )
        .bind(id_i64("context_id", attempt.context_id.value())?)
        .bind(id_i64("user_id", attempt.user_id.value())?)
        .bind(attempt.embed.as_str())
        .bind(id_i64("usage_id", attempt.usage_id.value())?)
        .bind(attempt.page_url.as_str())
        .bind(attempt.page_name.as_str())
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(res.last_insert_rowid()).map_err(ser)?;
        Ok(Attempt::from_new(AttemptId::new(id), attempt))
    }

    async fn touch_attempt(&self, id: AttemptId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let id = id_i64("attempt_id", id.value())?;
        let res = sqlx::query(
            r"
            UPDATE attempts
            SET modified_at = MAX(modified_at, ?2)
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_attempts_by_usage(
        &self,
        usage_id: UsageId,
    ) -> Result<Vec<ContextId>, StorageError> {
        let usage = id_i64("usage_id", usage_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let rows = sqlx::query("SELECT context_id FROM attempts WHERE usage_id = ?1")
            .bind(usage)
            .fetch_all(&mut *tx)
            .await
            .map_err(conn)?;

        sqlx::query("DELETE FROM question_steps WHERE usage_id = ?1")
            .bind(usage)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        sqlx::query("DELETE FROM attempts WHERE usage_id = ?1")
            .bind(usage)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        let mut contexts = Vec::with_capacity(rows.len());
        for row in rows {
            contexts.push(context_id_from_i64(
                row.try_get::<i64, _>("context_id").map_err(ser)?,
            )?);
        }
        Ok(contexts)
    }

    async fn delete_attempts(&self, context_id: ContextId) -> Result<Vec<UsageId>, StorageError> {
        let context = id_i64("context_id", context_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let rows = sqlx::query(
            "SELECT usage_id FROM attempts WHERE context_id = ?1 ORDER BY usage_id ASC",
        )
        .bind(context)
        .fetch_all(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query(
            r"
            DELETE FROM question_steps
            WHERE usage_id IN (SELECT usage_id FROM attempts WHERE context_id = ?1)
            ",
        )
        .bind(context)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM attempts WHERE context_id = ?1")
            .bind(context)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        let mut usages = Vec::with_capacity(rows.len());
        for row in rows {
            usages.push(usage_id_from_i64(row.try_get::<i64, _>("usage_id").map_err(ser)?)?);
        }
        Ok(usages)
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> Result<Vec<Attempt>, StorageError> {
        let users: Vec<UserId> = filter
            .users
            .enrolled
            .iter()
            .copied()
            .filter(|u| filter.users.allows(*u))
            .collect();
        if users.is_empty() {
            return Ok(Vec::new());
        }

        // Small location sets are pushed down; larger ones are applied per row.
        let push_locations = filter.locations.len() <= MAX_BOUND_IDS;
        let mut out = Vec::new();
        for chunk in users.chunks(MAX_BOUND_IDS) {
            let mut sql = format!(
                "SELECT {ATTEMPT_COLUMNS}
                 FROM attempts a
                 JOIN contexts c ON c.id = a.context_id
                 WHERE "
            );
            let mut next = match &filter.context {
                ContextScope::Activity(_) => {
                    sql.push_str("a.context_id = ?1");
                    2
                }
                ContextScope::CourseTree { .. } => {
                    sql.push_str("(c.path = ?1 OR c.path LIKE ?2)");
                    3
                }
            };

            sql.push_str(" AND a.user_id IN (");
            push_placeholders(&mut sql, next, chunk.len());
            sql.push(')');
            next += chunk.len();

            if push_locations && !filter.locations.is_empty() {
                sql.push_str(" AND a.context_id IN (");
                push_placeholders(&mut sql, next, filter.locations.len());
                sql.push(')');
            }

            let mut query = sqlx::query(&sql);
            match &filter.context {
                ContextScope::Activity(id) => {
                    query = query.bind(id_i64("context_id", id.value())?);
                }
                ContextScope::CourseTree { path, .. } => {
                    query = query
                        .bind(path.as_str().to_owned())
                        .bind(format!("{path}/%"));
                }
            }
            for user in chunk {
                query = query.bind(id_i64("user_id", user.value())?);
            }
            if push_locations {
                for location in &filter.locations {
                    query = query.bind(id_i64("context_id", location.value())?);
                }
            }

            for row in query.fetch_all(&self.pool).await.map_err(conn)? {
                let attempt = map_attempt_row(&row)?;
                if filter.locations.is_empty() || filter.locations.contains(&attempt.context_id()) {
                    out.push(attempt);
                }
            }
        }
        out.sort_by_key(Attempt::id);
        Ok(out)
    }
}
