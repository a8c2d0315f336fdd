//! SM-2 style review interval calculator on a 0–1 performance scale.

use serde::{Deserialize, Serialize};

/// Lowest ease factor the calculator will produce.
pub const MIN_EASE_FACTOR: f64 = 1.3;
/// Ease factor assigned to a question that has never been reviewed.
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
/// Performance at or above this counts as a successful recall.
pub const PASS_THRESHOLD: f64 = 0.6;

const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;

/// Result of scheduling one review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalUpdate {
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetitions: u32,
}

/// SM-2 ease update with `performance * 5` standing in for the 0–5 quality grade.
#[must_use]
pub fn next_ease_factor(ease_factor: f64, performance: f64) -> f64 {
    let miss = 5.0 - performance * 5.0;
    let next = ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
    if next.is_nan() {
        return MIN_EASE_FACTOR;
    }
    next.max(MIN_EASE_FACTOR)
}

/// Compute the next interval, ease factor and repetition count for a review.
///
/// A pass walks the 1 → 6 → `round(interval * ease)` ladder using the ease
/// factor the item had before this review; a fail restarts at one day with the
/// repetition count reset. The ease factor is recomputed either way.
///
/// ```
/// # use practice_core::interval::next_interval;
/// let update = next_interval(6, 2, 2.5, 0.8);
/// assert_eq!(update.interval_days, 15);
/// assert_eq!(update.repetitions, 3);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn next_interval(
    current_interval_days: u32,
    repetitions: u32,
    ease_factor: f64,
    performance: f64,
) -> IntervalUpdate {
    let performance = if performance.is_nan() {
        0.0
    } else {
        performance.clamp(0.0, 1.0)
    };
    let next_ease = next_ease_factor(ease_factor, performance);

    if performance < PASS_THRESHOLD {
        return IntervalUpdate {
            interval_days: FIRST_INTERVAL_DAYS,
            ease_factor: next_ease,
            repetitions: 0,
        };
    }

    let interval_days = match repetitions {
        0 => FIRST_INTERVAL_DAYS,
        1 => SECOND_INTERVAL_DAYS,
        _ => {
            let scaled = (f64::from(current_interval_days) * ease_factor).round();
            if scaled.is_nan() || scaled < 1.0 {
                FIRST_INTERVAL_DAYS
            } else if scaled >= f64::from(u32::MAX) {
                u32::MAX
            } else {
                scaled as u32
            }
        }
    };

    IntervalUpdate {
        interval_days,
        ease_factor: next_ease,
        repetitions: repetitions.saturating_add(1),
    }
}
