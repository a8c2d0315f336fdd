use practice_core::model::AttemptId;
use sqlx::SqliteConnection;

use super::SqliteRepository;
use super::mapping::{attempt_id_from_i64, id_to_i64, store_err};
use crate::repository::{AnswerRepository, AnswerWrite, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn commit_answer(&self, write: &AnswerWrite) -> Result<AttemptId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        match write_answer(&mut *tx, write).await {
            Ok(attempt_id) => {
                tx.commit().await.map_err(store_err)?;
                Ok(attempt_id)
            }
            Err(err) => {
                tx.rollback().await.map_err(store_err)?;
                tracing::debug!(error = %err, "answer commit rolled back");
                Err(err)
            }
        }
    }
}

async fn write_answer(
    tx: &mut SqliteConnection,
    write: &AnswerWrite,
) -> Result<AttemptId, StorageError> {
    let session_id = id_to_i64("session_id", write.session.id().value())?;
    let question_id = id_to_i64("question_id", write.review.question_id().value())?;
    let learner_id = write.session.learner_id();

    // Writing first takes the database write lock before anything is read.
    let res = sqlx::query(
        r"
        UPDATE sessions
        SET total_answers = ?1,
            correct_answers = ?2,
            incorrect_answers = ?3
        WHERE id = ?4 AND total_answers = ?5 AND completed_at IS NULL
        ",
    )
    .bind(i64::from(write.session.total_answers()))
    .bind(i64::from(write.session.correct_answers()))
    .bind(i64::from(write.session.incorrect_answers()))
    .bind(session_id)
    .bind(i64::from(write.expected_session_answers))
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;

    if res.rows_affected() == 0 {
        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        return Err(if exists.is_some() {
            StorageError::Conflict
        } else {
            StorageError::NotFound
        });
    }

    let res = sqlx::query(
        r"
        INSERT INTO attempts (session_id, question_id, is_correct, response_time_ms, attempted_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )
    .bind(id_to_i64("session_id", write.attempt.session_id.value())?)
    .bind(id_to_i64("question_id", write.attempt.question_id.value())?)
    .bind(write.attempt.is_correct)
    .bind(write.attempt.response_time_ms.map(i64::from))
    .bind(write.attempt.attempted_at)
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;
    let attempt_id = attempt_id_from_i64(res.last_insert_rowid())?;

    let progress = &write.progress;
    let res = match write.expected_progress_attempts {
        Some(expected) => {
            sqlx::query(
                r"
                UPDATE topic_progress
                SET mastery_level = ?1,
                    last_practiced = ?2,
                    total_attempts = ?3,
                    correct_attempts = ?4
                WHERE learner_id = ?5 AND topic = ?6 AND total_attempts = ?7
                ",
            )
            .bind(progress.mastery_level())
            .bind(progress.last_practiced())
            .bind(i64::from(progress.total_attempts()))
            .bind(i64::from(progress.correct_attempts()))
            .bind(progress.learner_id().as_uuid())
            .bind(progress.topic().as_str())
            .bind(i64::from(expected))
            .execute(&mut *tx)
            .await
        }
        None => {
            sqlx::query(
                r"
                INSERT INTO topic_progress
                    (learner_id, topic, mastery_level, last_practiced, total_attempts, correct_attempts)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(learner_id, topic) DO NOTHING
                ",
            )
            .bind(progress.learner_id().as_uuid())
            .bind(progress.topic().as_str())
            .bind(progress.mastery_level())
            .bind(progress.last_practiced())
            .bind(i64::from(progress.total_attempts()))
            .bind(i64::from(progress.correct_attempts()))
            .execute(&mut *tx)
            .await
        }
    }
    .map_err(store_err)?;
    if res.rows_affected() == 0 {
        return Err(StorageError::Conflict);
    }

    let review = &write.review;
    let res = match write.expected_review_count {
        Some(expected) => {
            sqlx::query(
                r"
                UPDATE review_states
                SET ease_factor = ?1,
                    interval_days = ?2,
                    repetitions = ?3,
                    review_count = ?4,
                    last_reviewed_at = ?5,
                    next_review_at = ?6
                WHERE learner_id = ?7 AND question_id = ?8 AND review_count = ?9
                ",
            )
            .bind(review.ease_factor())
            .bind(i64::from(review.interval_days()))
            .bind(i64::from(review.repetitions()))
            .bind(i64::from(review.review_count()))
            .bind(review.last_reviewed_at())
            .bind(review.next_review_at())
            .bind(learner_id.as_uuid())
            .bind(question_id)
            .bind(i64::from(expected))
            .execute(&mut *tx)
            .await
        }
        None => {
            sqlx::query(
                r"
                INSERT INTO review_states
                    (learner_id, question_id, ease_factor, interval_days, repetitions,
                     review_count, last_reviewed_at, next_review_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(learner_id, question_id) DO NOTHING
                ",
            )
            .bind(learner_id.as_uuid())
            .bind(question_id)
            .bind(review.ease_factor())
            .bind(i64::from(review.interval_days()))
            .bind(i64::from(review.repetitions()))
            .bind(i64::from(review.review_count()))
            .bind(review.last_reviewed_at())
            .bind(review.next_review_at())
            .execute(&mut *tx)
            .await
        }
    }
    .map_err(store_err)?;
    if res.rows_affected() == 0 {
        return Err(StorageError::Conflict);
    }

    Ok(attempt_id)
}
