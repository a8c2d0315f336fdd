use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::mastery::{self, MasteryRule, MasteryTier};
use crate::model::ids::LearnerId;
use crate::model::question::Topic;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("correct attempts ({correct}) exceed total attempts ({total})")]
    CorrectExceedsTotal { correct: u32, total: u32 },

    #[error("mastery level must be a finite value in [0, 100], got {0}")]
    InvalidMastery(f64),
}

/// What a single attempt contributes to a topic's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressUpdate {
    /// A right/wrong answer; mastery follows the accuracy rule.
    Answered { is_correct: bool },
    /// A 0–1 performance sample; mastery follows the continuous rule.
    /// Samples above 0.5 count as correct.
    Graded { performance: f64 },
}

impl ProgressUpdate {
    #[must_use]
    pub fn rule(self) -> MasteryRule {
        match self {
            ProgressUpdate::Answered { .. } => MasteryRule::Accuracy,
            ProgressUpdate::Graded { .. } => MasteryRule::Continuous,
        }
    }

    #[must_use]
    pub fn is_correct(self) -> bool {
        match self {
            ProgressUpdate::Answered { is_correct } => is_correct,
            ProgressUpdate::Graded { performance } => performance > 0.5,
        }
    }
}

/// A learner's standing in one topic. At most one exists per (learner, topic).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicProgress {
    learner_id: LearnerId,
    topic: Topic,
    mastery_level: f64,
    last_practiced: DateTime<Utc>,
    total_attempts: u32,
    correct_attempts: u32,
}

impl TopicProgress {
    /// Empty progress for a topic the learner has never attempted.
    ///
    /// Not meant to be persisted as-is; apply the first attempt to it.
    #[must_use]
    pub fn untouched(learner_id: LearnerId, topic: Topic, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            topic,
            mastery_level: 0.0,
            last_practiced: now,
            total_attempts: 0,
            correct_attempts: 0,
        }
    }

    /// Rehydrate progress from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if counters are inconsistent or mastery is out of range.
    pub fn from_persisted(
        learner_id: LearnerId,
        topic: Topic,
        mastery_level: f64,
        last_practiced: DateTime<Utc>,
        total_attempts: u32,
        correct_attempts: u32,
    ) -> Result<Self, ProgressError> {
        if correct_attempts > total_attempts {
            return Err(ProgressError::CorrectExceedsTotal {
                correct: correct_attempts,
                total: total_attempts,
            });
        }
        if !mastery_level.is_finite() || !(0.0..=100.0).contains(&mastery_level) {
            return Err(ProgressError::InvalidMastery(mastery_level));
        }

        Ok(Self {
            learner_id,
            topic,
            mastery_level,
            last_practiced,
            total_attempts,
            correct_attempts,
        })
    }

    /// Fold one attempt into the counters and recompute mastery.
    pub fn apply(&mut self, update: ProgressUpdate, practiced_at: DateTime<Utc>) {
        let previous_total = self.total_attempts;
        self.total_attempts = self.total_attempts.saturating_add(1);
        if update.is_correct() {
            self.correct_attempts = self
                .correct_attempts
                .saturating_add(1)
                .min(self.total_attempts);
        }

        self.mastery_level = match update {
            ProgressUpdate::Answered { .. } => {
                mastery::accuracy_mastery(self.correct_attempts, self.total_attempts)
            }
            ProgressUpdate::Graded { performance } => mastery::update_mastery(
                self.mastery_level,
                performance,
                i64::from(previous_total),
            ),
        };
        self.last_practiced = practiced_at;
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn mastery_level(&self) -> f64 {
        self.mastery_level
    }

    #[must_use]
    pub fn last_practiced(&self) -> DateTime<Utc> {
        self.last_practiced
    }

    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    #[must_use]
    pub fn correct_attempts(&self) -> u32 {
        self.correct_attempts
    }

    /// Fraction of correct attempts, or `None` before the first attempt.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_attempts == 0 {
            return None;
        }
        Some(f64::from(self.correct_attempts) / f64::from(self.total_attempts))
    }

    #[must_use]
    pub fn tier(&self) -> MasteryTier {
        MasteryTier::for_level(self.mastery_level)
    }
}
