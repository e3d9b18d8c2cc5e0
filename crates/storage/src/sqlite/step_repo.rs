use report_core::model::{QuestionStep, UsageId};

use super::SqliteRepository;
use super::mapping::{MAX_BOUND_IDS, conn, id_i64, map_step_row, push_placeholders};
use crate::repository::{QuestionStepRepository, StorageError};

#[async_trait::async_trait]
impl QuestionStepRepository for SqliteRepository {
    async fn append_step(&self, step: &QuestionStep) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO question_steps (
                id, usage_id, slot, question_attempt_id, sequence_number,
                state, fraction, user_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(id_i64("step_id", step.id.value())?)
        .bind(id_i64("usage_id", step.usage_id.value())?)
        .bind(i64::from(step.slot))
        .bind(id_i64("question_attempt_id", step.question_attempt_id.value())?)
        .bind(i64::from(step.sequence_number))
        .bind(step.state.as_str())
        .bind(step.fraction)
        .bind(id_i64("user_id", step.user_id.value())?)
        .bind(step.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn steps_for_usages(
        &self,
        usage_ids: &[UsageId],
    ) -> Result<Vec<QuestionStep>, StorageError> {
        let mut out = Vec::new();
        for chunk in usage_ids.chunks(MAX_BOUND_IDS) {
            let mut sql = String::from(
                r"
                SELECT
                    id, usage_id, slot, question_attempt_id, sequence_number,
                    state, fraction, user_id, created_at
                FROM question_steps
                WHERE usage_id IN (
                ",
            );
            push_placeholders(&mut sql, 1, chunk.len());
            sql.push(')');

            let mut query = sqlx::query(&sql);
            for usage in chunk {
                query = query.bind(id_i64("usage_id", usage.value())?);
            }

            for row in query.fetch_all(&self.pool).await.map_err(conn)? {
                out.push(map_step_row(&row)?);
            }
        }
        out.sort_by_key(|s| s.id);
        Ok(out)
    }
}
