use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::interval::{self, DEFAULT_EASE_FACTOR, IntervalUpdate, MIN_EASE_FACTOR};
use crate::model::ids::{LearnerId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ReviewStateError {
    #[error("ease factor must be finite and >= 1.3, got {0}")]
    InvalidEaseFactor(f64),
}

/// Per-(learner, question) SM-2 scheduling record.
///
/// `review_count` only ever grows, so writers use it as the row version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewState {
    learner_id: LearnerId,
    question_id: QuestionId,
    ease_factor: f64,
    interval_days: u32,
    repetitions: u32,
    review_count: u32,
    last_reviewed_at: DateTime<Utc>,
    next_review_at: DateTime<Utc>,
}

impl ReviewState {
    /// Schedule state for a question reviewed for the first time at `reviewed_at`.
    ///
    /// The returned state has not absorbed that review yet; call `apply_review`.
    #[must_use]
    pub fn unseen(learner_id: LearnerId, question_id: QuestionId, reviewed_at: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            question_id,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
            review_count: 0,
            last_reviewed_at: reviewed_at,
            next_review_at: reviewed_at,
        }
    }

    /// # Errors
    ///
    /// Returns `ReviewStateError::InvalidEaseFactor` for a non-finite or sub-floor ease.
    pub fn from_persisted(
        learner_id: LearnerId,
        question_id: QuestionId,
        ease_factor: f64,
        interval_days: u32,
        repetitions: u32,
        review_count: u32,
        last_reviewed_at: DateTime<Utc>,
        next_review_at: DateTime<Utc>,
    ) -> Result<Self, ReviewStateError> {
        if !ease_factor.is_finite() || ease_factor < MIN_EASE_FACTOR {
            return Err(ReviewStateError::InvalidEaseFactor(ease_factor));
        }
        Ok(Self {
            learner_id,
            question_id,
            ease_factor,
            interval_days,
            repetitions,
            review_count,
            last_reviewed_at,
            next_review_at,
        })
    }

    /// Run the interval calculator for a review and move the due date.
    pub fn apply_review(&mut self, performance: f64, reviewed_at: DateTime<Utc>) -> IntervalUpdate {
        let update = interval::next_interval(
            self.interval_days,
            self.repetitions,
            self.ease_factor,
            performance,
        );
        self.ease_factor = update.ease_factor;
        self.interval_days = update.interval_days;
        self.repetitions = update.repetitions;
        self.review_count = self.review_count.saturating_add(1);
        self.last_reviewed_at = reviewed_at;
        self.next_review_at = reviewed_at + Duration::days(i64::from(update.interval_days));
        update
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn ease_factor(&self) -> f64 {
        self.ease_factor
    }

    #[must_use]
    pub fn interval_days(&self) -> u32 {
        self.interval_days
    }

    #[must_use]
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Reviews absorbed so far, including failed ones.
    #[must_use]
    pub fn review_count(&self) -> u32 {
        self.review_count
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> DateTime<Utc> {
        self.last_reviewed_at
    }

    #[must_use]
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.next_review_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn successive_passes_follow_sm2_ladder() {
        let now = fixed_now();
        let mut state = ReviewState::unseen(LearnerId::random(), QuestionId::new(1), now);

        state.apply_review(0.8, now);
        assert_eq!(state.interval_days(), 1);
        assert_eq!(state.next_review_at(), now + Duration::days(1));

        let second = now + Duration::days(1);
        state.apply_review(0.8, second);
        assert_eq!(state.interval_days(), 6);

        let third = second + Duration::days(6);
        state.apply_review(0.8, third);
        assert_eq!(state.interval_days(), 15);
        assert_eq!(state.repetitions(), 3);
        assert_eq!(state.review_count(), 3);
        assert!(state.is_due(third + Duration::days(15)));
        assert!(!state.is_due(third + Duration::days(14)));
    }

    #[test]
    fn failure_resets_schedule() {
        let now = fixed_now();
        let mut state = ReviewState::from_persisted(
            LearnerId::random(),
            QuestionId::new(1),
            2.5,
            15,
            3,
            7,
            now,
            now,
        )
        .unwrap();

        state.apply_review(0.2, now);
        assert_eq!(state.interval_days(), 1);
        assert_eq!(state.repetitions(), 0);
        assert!(state.ease_factor() < 2.5);
        assert_eq!(state.review_count(), 8);
    }

    #[test]
    fn rejects_sub_floor_ease() {
        assert!(matches!(
            ReviewState::from_persisted(LearnerId::random(), QuestionId::new(1), 1.0, 1, 1, 1, fixed_now(), fixed_now()),
            Err(ReviewStateError::InvalidEaseFactor(_))
        ));
    }
}
