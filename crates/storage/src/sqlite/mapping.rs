use chrono::{DateTime, Utc};
use practice_core::model::{
    Attempt, AttemptId, Difficulty, LearnerId, Question, QuestionId, RecentAttempt, ReviewState,
    Session, SessionId, Topic, TopicProgress,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Classify a driver error into the storage error taxonomy.
pub(crate) fn store_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            StorageError::ConstraintViolation(db.message().to_string())
        }
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_)
        | sqlx::Error::TypeNotFound { .. }) => StorageError::Serialization(e.to_string()),
        other => StorageError::Unavailable(other.to_string()),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

fn learner_id(row: &SqliteRow) -> Result<LearnerId, StorageError> {
    let raw: Uuid = row.try_get("learner_id").map_err(ser)?;
    Ok(LearnerId::new(raw))
}

fn topic(row: &SqliteRow) -> Result<Topic, StorageError> {
    Topic::new(row.try_get::<String, _>("topic").map_err(ser)?).map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;
    Ok(Question {
        id: question_id_from_i64(row.try_get("id").map_err(ser)?)?,
        topic: topic(row)?,
        prompt: row.try_get("prompt").map_err(ser)?,
        answer: row.try_get("answer").map_err(ser)?,
        difficulty: difficulty.parse::<Difficulty>().map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<Attempt, StorageError> {
    let response_time_ms = row
        .try_get::<Option<i64>, _>("response_time_ms")
        .map_err(ser)?
        .map(|ms| i64_to_u32("response_time_ms", ms))
        .transpose()?;

    Ok(Attempt {
        id: attempt_id_from_i64(row.try_get("id").map_err(ser)?)?,
        session_id: session_id_from_i64(row.try_get("session_id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        response_time_ms,
        attempted_at: row.try_get("attempted_at").map_err(ser)?,
    })
}

pub(crate) fn map_recent_attempt_row(row: &SqliteRow) -> Result<RecentAttempt, StorageError> {
    Ok(RecentAttempt {
        question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        topic: topic(row)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        attempted_at: row.try_get("attempted_at").map_err(ser)?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<TopicProgress, StorageError> {
    TopicProgress::from_persisted(
        learner_id(row)?,
        topic(row)?,
        row.try_get("mastery_level").map_err(ser)?,
        row.try_get("last_practiced").map_err(ser)?,
        i64_to_u32("total_attempts", row.try_get("total_attempts").map_err(ser)?)?,
        i64_to_u32("correct_attempts", row.try_get("correct_attempts").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<Session, StorageError> {
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
    Session::from_persisted(
        session_id_from_i64(row.try_get("id").map_err(ser)?)?,
        learner_id(row)?,
        row.try_get("started_at").map_err(ser)?,
        completed_at,
        i64_to_u32("total_answers", row.try_get("total_answers").map_err(ser)?)?,
        i64_to_u32("correct_answers", row.try_get("correct_answers").map_err(ser)?)?,
        i64_to_u32("incorrect_answers", row.try_get("incorrect_answers").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_review_state_row(row: &SqliteRow) -> Result<ReviewState, StorageError> {
    ReviewState::from_persisted(
        learner_id(row)?,
        question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        row.try_get("ease_factor").map_err(ser)?,
        i64_to_u32("interval_days", row.try_get("interval_days").map_err(ser)?)?,
        i64_to_u32("repetitions", row.try_get("repetitions").map_err(ser)?)?,
        i64_to_u32("review_count", row.try_get("review_count").map_err(ser)?)?,
        row.try_get("last_reviewed_at").map_err(ser)?,
        row.try_get("next_review_at").map_err(ser)?,
    )
    .map_err(ser)
}
