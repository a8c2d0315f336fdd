use chrono::{DateTime, Utc};
use practice_core::model::{LearnerId, Session, SessionId};

use super::SqliteRepository;
use super::mapping::{id_to_i64, map_session_row, session_id_from_i64, store_err};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(
        &self,
        learner_id: LearnerId,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO sessions
                (learner_id, started_at, completed_at, total_answers, correct_answers, incorrect_answers)
            VALUES (?1, ?2, NULL, 0, 0, 0)
            ",
        )
        .bind(learner_id.as_uuid())
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        let id = session_id_from_i64(res.last_insert_rowid())?;
        Ok(Session::start(id, learner_id, started_at))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, learner_id, started_at, completed_at, total_answers, correct_answers, incorrect_answers
            FROM sessions WHERE id = ?1
            ",
        )
        .bind(id_to_i64("session_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn update_session(
        &self,
        session: &Session,
        expected_total_answers: u32,
    ) -> Result<(), StorageError> {
        let id = id_to_i64("session_id", session.id().value())?;
        let res = sqlx::query(
            r"
            UPDATE sessions
            SET completed_at = ?1,
                total_answers = ?2,
                correct_answers = ?3,
                incorrect_answers = ?4
            WHERE id = ?5 AND total_answers = ?6 AND completed_at IS NULL
            ",
        )
        .bind(session.completed_at())
        .bind(i64::from(session.total_answers()))
        .bind(i64::from(session.correct_answers()))
        .bind(i64::from(session.incorrect_answers()))
        .bind(id)
        .bind(i64::from(expected_total_answers))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if res.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }
}
