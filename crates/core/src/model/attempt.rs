use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{AttemptId, QuestionId, SessionId};
use crate::model::question::Topic;

/// One answer event, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub response_time_ms: Option<u32>,
    pub attempted_at: DateTime<Utc>,
}

impl NewAttempt {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        question_id: QuestionId,
        is_correct: bool,
        response_time_ms: Option<u32>,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            question_id,
            is_correct,
            response_time_ms,
            attempted_at,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: AttemptId) -> Attempt {
        Attempt {
            id,
            session_id: self.session_id,
            question_id: self.question_id,
            is_correct: self.is_correct,
            response_time_ms: self.response_time_ms,
            attempted_at: self.attempted_at,
        }
    }
}

/// Append-only record of a learner answering a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub response_time_ms: Option<u32>,
    pub attempted_at: DateTime<Utc>,
}

/// An attempt joined with its question's topic, as returned by
/// recent-history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAttempt {
    pub question_id: QuestionId,
    pub topic: Topic,
    pub is_correct: bool,
    pub attempted_at: DateTime<Utc>,
}

const SLOW_RESPONSE_MS: u32 = 30_000;
const HESITANT_RESPONSE_MS: u32 = 10_000;

/// Maps a boolean answer and its latency onto the 0–1 performance scale used
/// by the interval calculator.
///
/// Incorrect answers score 0.2; correct answers score 1.0, dropping to 0.8
/// past 10 s and 0.6 past 30 s. Unknown latency counts as a clean recall.
#[must_use]
pub fn attempt_performance(is_correct: bool, response_time_ms: Option<u32>) -> f64 {
    if !is_correct {
        return 0.2;
    }
    match response_time_ms {
        Some(ms) if ms > SLOW_RESPONSE_MS => 0.6,
        Some(ms) if ms > HESITANT_RESPONSE_MS => 0.8,
        _ => 1.0,
    }
}
