use chrono::{DateTime, Utc};
use practice_core::model::{LearnerId, QuestionId, ReviewState};

use super::SqliteRepository;
use super::mapping::{id_to_i64, map_review_state_row, store_err};
use crate::repository::{ReviewStateRepository, StorageError};

#[async_trait::async_trait]
impl ReviewStateRepository for SqliteRepository {
    async fn get_review_state(
        &self,
        learner_id: LearnerId,
        question_id: QuestionId,
    ) -> Result<Option<ReviewState>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT learner_id, question_id, ease_factor, interval_days, repetitions,
                   review_count, last_reviewed_at, next_review_at
            FROM review_states
            WHERE learner_id = ?1 AND question_id = ?2
            ",
        )
        .bind(learner_id.as_uuid())
        .bind(id_to_i64("question_id", question_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(map_review_state_row).transpose()
    }

    async fn upsert_review_state(&self, state: &ReviewState) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO review_states
                (learner_id, question_id, ease_factor, interval_days, repetitions,
                 review_count, last_reviewed_at, next_review_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(learner_id, question_id) DO UPDATE SET
                ease_factor = excluded.ease_factor,
                interval_days = excluded.interval_days,
                repetitions = excluded.repetitions,
                review_count = excluded.review_count,
                last_reviewed_at = excluded.last_reviewed_at,
                next_review_at = excluded.next_review_at
            ",
        )
        .bind(state.learner_id().as_uuid())
        .bind(id_to_i64("question_id", state.question_id().value())?)
        .bind(state.ease_factor())
        .bind(i64::from(state.interval_days()))
        .bind(i64::from(state.repetitions()))
        .bind(i64::from(state.review_count()))
        .bind(state.last_reviewed_at())
        .bind(state.next_review_at())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn due_review_states(
        &self,
        learner_id: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewState>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id, question_id, ease_factor, interval_days, repetitions,
                   review_count, last_reviewed_at, next_review_at
            FROM review_states
            WHERE learner_id = ?1 AND next_review_at <= ?2
            ORDER BY next_review_at ASC, question_id ASC
            ",
        )
        .bind(learner_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(map_review_state_row).collect()
    }
}
