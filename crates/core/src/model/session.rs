use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{LearnerId, SessionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("session already completed")]
    AlreadyCompleted,

    #[error("total answers ({total}) does not match correct + incorrect ({sum})")]
    CountMismatch { total: u32, sum: u32 },
}

/// A run of attempts by one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    id: SessionId,
    learner_id: LearnerId,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    total_answers: u32,
    correct_answers: u32,
    incorrect_answers: u32,
}

impl Session {
    /// A freshly opened session with zeroed counters.
    #[must_use]
    pub fn start(id: SessionId, learner_id: LearnerId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            learner_id,
            started_at,
            completed_at: None,
            total_answers: 0,
            correct_answers: 0,
            incorrect_answers: 0,
        }
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if timestamps or counters do not line up.
    pub fn from_persisted(
        id: SessionId,
        learner_id: LearnerId,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        total_answers: u32,
        correct_answers: u32,
        incorrect_answers: u32,
    ) -> Result<Self, SessionStateError> {
        if completed_at.is_some_and(|done| done < started_at) {
            return Err(SessionStateError::InvalidTimeRange);
        }
        let sum = correct_answers.saturating_add(incorrect_answers);
        if sum != total_answers {
            return Err(SessionStateError::CountMismatch {
                total: total_answers,
                sum,
            });
        }

        Ok(Self {
            id,
            learner_id,
            started_at,
            completed_at,
            total_answers,
            correct_answers,
            incorrect_answers,
        })
    }

    /// Count one answer against this session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadyCompleted` once the session is closed.
    pub fn record_answer(&mut self, is_correct: bool) -> Result<(), SessionStateError> {
        if self.is_completed() {
            return Err(SessionStateError::AlreadyCompleted);
        }
        self.total_answers = self.total_answers.saturating_add(1);
        if is_correct {
            self.correct_answers = self.correct_answers.saturating_add(1);
        } else {
            self.incorrect_answers = self.incorrect_answers.saturating_add(1);
        }
        Ok(())
    }

    /// Close the session.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyCompleted` on a second call and `InvalidTimeRange` if
    /// `at` precedes the start.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), SessionStateError> {
        if self.is_completed() {
            return Err(SessionStateError::AlreadyCompleted);
        }
        if at < self.started_at {
            return Err(SessionStateError::InvalidTimeRange);
        }
        self.completed_at = Some(at);
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    #[must_use]
    pub fn total_answers(&self) -> u32 {
        self.total_answers
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn incorrect_answers(&self) -> u32 {
        self.incorrect_answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn answers_update_counters() {
        let mut session = Session::start(SessionId::new(1), LearnerId::random(), fixed_now());
        session.record_answer(true).unwrap();
        session.record_answer(false).unwrap();
        session.record_answer(true).unwrap();

        assert_eq!(session.total_answers(), 3);
        assert_eq!(session.correct_answers(), 2);
        assert_eq!(session.incorrect_answers(), 1);
    }

    #[test]
    fn completed_session_rejects_answers_and_second_completion() {
        let now = fixed_now();
        let mut session = Session::start(SessionId::new(1), LearnerId::random(), now);
        session.complete(now + Duration::minutes(5)).unwrap();

        assert_eq!(session.record_answer(true), Err(SessionStateError::AlreadyCompleted));
        assert_eq!(session.complete(now), Err(SessionStateError::AlreadyCompleted));
    }

    #[test]
    fn completion_before_start_is_rejected() {
        let now = fixed_now();
        let mut session = Session::start(SessionId::new(1), LearnerId::random(), now);
        assert_eq!(
            session.complete(now - Duration::seconds(1)),
            Err(SessionStateError::InvalidTimeRange)
        );
    }

    #[test]
    fn from_persisted_checks_counts() {
        let err = Session::from_persisted(
            SessionId::new(1),
            LearnerId::random(),
            fixed_now(),
            None,
            3,
            1,
            1,
        )
        .unwrap_err();
        assert_eq!(err, SessionStateError::CountMismatch { total: 3, sum: 2 });
    }
}
