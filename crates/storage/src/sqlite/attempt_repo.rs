use practice_core::model::{Attempt, AttemptId, LearnerId, NewAttempt, RecentAttempt, SessionId};

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_i64, id_to_i64, map_attempt_row, map_recent_attempt_row, store_err,
};
use crate::repository::{AttemptRepository, StorageError};

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO attempts (session_id, question_id, is_correct, response_time_ms, attempted_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id_to_i64("session_id", attempt.session_id.value())?)
        .bind(id_to_i64("question_id", attempt.question_id.value())?)
        .bind(attempt.is_correct)
        .bind(attempt.response_time_ms.map(i64::from))
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        attempt_id_from_i64(res.last_insert_rowid())
    }

    async fn attempts_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, question_id, is_correct, response_time_ms, attempted_at
            FROM attempts
            WHERE session_id = ?1
            ORDER BY attempted_at ASC, id ASC
            ",
        )
        .bind(id_to_i64("session_id", session_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(map_attempt_row).collect()
    }

    async fn recent_attempts(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<RecentAttempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT a.question_id, q.topic, a.is_correct, a.attempted_at
            FROM attempts a
            JOIN sessions s ON s.id = a.session_id
            JOIN questions q ON q.id = a.question_id
            WHERE s.learner_id = ?1
            ORDER BY a.attempted_at DESC, a.id DESC
            LIMIT ?2
            ",
        )
        .bind(learner_id.as_uuid())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(map_recent_attempt_row).collect()
    }
}
