//! Mastery estimation for a learner's topic.
//!
//! Two update rules are supported side by side:
//!
//! - [`update_mastery`] nudges an existing estimate with a continuous 0–1
//!   performance sample. Gains shrink as mastery nears the ceiling, misses
//!   cost half as much as hits earn, and the step grows with accumulated
//!   evidence.
//! - [`accuracy_mastery`] recomputes mastery from scratch out of the
//!   correct/total counters, with a consistency bonus for sustained accuracy.
//!
//! Callers pick one per signal through [`MasteryRule`]. Both clamp their inputs
//! rather than rejecting them, so they are total over `f64`.

use serde::{Deserialize, Serialize};

pub const MASTERY_FLOOR: f64 = 0.0;
pub const MASTERY_CEILING: f64 = 100.0;

const BASE_LEARNING_RATE: f64 = 0.1;
const NEUTRAL_PERFORMANCE: f64 = 0.5;
const GAIN_SCALE: f64 = 100.0;
const LOSS_SCALE: f64 = 50.0;
const STABILITY_ATTEMPTS: f64 = 10.0;

const BONUS_MIN_ATTEMPTS: u32 = 5;
const BONUS_MIN_ACCURACY: f64 = 0.8;
const BONUS_PER_ATTEMPT: f64 = 0.5;
const BONUS_CAP: f64 = 10.0;

/// Which update rule produced a mastery value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryRule {
    /// [`accuracy_mastery`] over the topic counters.
    Accuracy,
    /// [`update_mastery`] from a performance sample.
    Continuous,
}

fn clamp_mastery(value: f64) -> f64 {
    if value.is_nan() {
        return MASTERY_FLOOR;
    }
    value.clamp(MASTERY_FLOOR, MASTERY_CEILING)
}

/// Move `current_mastery` toward the evidence in `performance`.
///
/// `performance` above 0.5 raises mastery, at or below 0.5 lowers it (exactly
/// 0.5 leaves it unchanged).
///
/// ```
/// # use practice_core::mastery::update_mastery;
/// assert_eq!(update_mastery(50.0, 0.5, 0), 50.0);
/// assert!(update_mastery(50.0, 0.9, 3) > 50.0);
/// assert!(update_mastery(50.0, 0.1, 3) < 50.0);
/// ```
#[must_use]
pub fn update_mastery(current_mastery: f64, performance: f64, total_attempts: i64) -> f64 {
    let current = clamp_mastery(current_mastery);
    let performance = if performance.is_nan() {
        NEUTRAL_PERFORMANCE
    } else {
        performance.clamp(0.0, 1.0)
    };
    #[allow(clippy::cast_precision_loss)]
    let attempts = total_attempts.max(0) as f64;

    let learning_rate = BASE_LEARNING_RATE * (1.0 - current / MASTERY_CEILING);
    let change = if performance > NEUTRAL_PERFORMANCE {
        learning_rate * (performance - NEUTRAL_PERFORMANCE) * GAIN_SCALE
    } else {
        -learning_rate * (NEUTRAL_PERFORMANCE - performance) * LOSS_SCALE
    };
    let stability = 1.0 + (attempts / STABILITY_ATTEMPTS).min(1.0);

    clamp_mastery(current + change * stability)
}

/// Mastery derived from the correct/total counters of a topic.
///
/// ```
/// # use practice_core::mastery::accuracy_mastery;
/// assert_eq!(accuracy_mastery(8, 10), 85.0);
/// assert_eq!(accuracy_mastery(0, 0), 0.0);
/// ```
#[must_use]
pub fn accuracy_mastery(correct_attempts: u32, total_attempts: u32) -> f64 {
    if total_attempts == 0 {
        return MASTERY_FLOOR;
    }
    let correct = correct_attempts.min(total_attempts);
    let accuracy = f64::from(correct) / f64::from(total_attempts);
    let mut mastery = accuracy * MASTERY_CEILING;

    if total_attempts >= BONUS_MIN_ATTEMPTS && accuracy >= BONUS_MIN_ACCURACY {
        mastery += (f64::from(total_attempts) * BONUS_PER_ATTEMPT).min(BONUS_CAP);
    }

    clamp_mastery(mastery)
}

//
// ─── TIERS ─────────────────────────────────────────────────────────────────────
//

/// Coarse classification of a topic's mastery used for recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryTier {
    /// No progress recorded yet.
    New,
    /// Below 30.
    NeedsAttention,
    /// 30 up to 60.
    Practicing,
    /// 60 up to 80.
    Reviewing,
    /// 80 and above.
    Maintenance,
}

impl MasteryTier {
    #[must_use]
    pub fn for_level(mastery_level: f64) -> Self {
        match mastery_level {
            m if m < 30.0 => MasteryTier::NeedsAttention,
            m if m < 60.0 => MasteryTier::Practicing,
            m if m < 80.0 => MasteryTier::Reviewing,
            _ => MasteryTier::Maintenance,
        }
    }

    /// Base recommendation priority before the recency bonus.
    #[must_use]
    pub fn base_priority(self) -> f64 {
        match self {
            MasteryTier::NeedsAttention => 90.0,
            MasteryTier::New => 80.0,
            MasteryTier::Practicing => 70.0,
            MasteryTier::Reviewing => 50.0,
            MasteryTier::Maintenance => 20.0,
        }
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            MasteryTier::New => "new topic",
            MasteryTier::NeedsAttention => "needs immediate attention",
            MasteryTier::Practicing => "continue practicing",
            MasteryTier::Reviewing => "occasional review",
            MasteryTier::Maintenance => "maintenance only",
        }
    }
}
