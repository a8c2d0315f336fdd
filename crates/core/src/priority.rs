//! Priority scoring and ranking of candidate questions.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mastery::MASTERY_CEILING;
use crate::model::{Difficulty, Question, TopicProgress};
use crate::time::whole_days_between;

pub const BASE_PRIORITY: f64 = 50.0;
pub const MAX_PRIORITY: f64 = 100.0;

const MASTERY_WEIGHT: f64 = 0.5;
const NEW_TOPIC_BONUS: f64 = 25.0;
const RECENCY_PER_DAY: f64 = 2.0;
const RECENCY_CAP: f64 = 20.0;
const RECENT_REPEAT_PENALTY: f64 = 30.0;
const STRUGGLING_RATE: f64 = 0.5;
const STRUGGLING_BONUS: f64 = 20.0;
const COMFORTABLE_RATE: f64 = 0.8;
const COMFORTABLE_PENALTY: f64 = 10.0;

/// Additive bonus for questions of the given difficulty.
#[must_use]
pub fn difficulty_bonus(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 5.0,
        Difficulty::Medium => 10.0,
        Difficulty::Hard => 15.0,
    }
}

/// Bonus for a topic that has gone unpractised: two points per whole day, capped at 20.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recency_bonus(last_practiced: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = whole_days_between(last_practiced, now) as f64;
    (days * RECENCY_PER_DAY).min(RECENCY_CAP)
}

/// Each additive factor that went into a priority score, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorityBreakdown {
    pub mastery: f64,
    pub recency: f64,
    pub difficulty: f64,
    pub repetition: f64,
    pub success_rate: f64,
}

impl PriorityBreakdown {
    /// Compute every factor for `question`.
    ///
    /// `progress` is the learner's progress in the question's topic, `None` for
    /// a topic they have never attempted.
    #[must_use]
    pub fn compute(
        question: &Question,
        progress: Option<&TopicProgress>,
        recently_attempted: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mastery = match progress {
            Some(p) => (MASTERY_CEILING - p.mastery_level()) * MASTERY_WEIGHT,
            None => NEW_TOPIC_BONUS,
        };

        let recency = progress.map_or(0.0, |p| recency_bonus(p.last_practiced(), now));

        let repetition = if recently_attempted {
            -RECENT_REPEAT_PENALTY
        } else {
            0.0
        };

        let success_rate = match progress.and_then(TopicProgress::success_rate) {
            Some(rate) if rate < STRUGGLING_RATE => STRUGGLING_BONUS,
            Some(rate) if rate > COMFORTABLE_RATE => -COMFORTABLE_PENALTY,
            _ => 0.0,
        };

        Self {
            mastery,
            recency,
            difficulty: difficulty_bonus(question.difficulty),
            repetition,
            success_rate,
        }
    }

    /// Sum of all factors on top of the base, clamped to `[0, 100]`.
    #[must_use]
    pub fn total(&self) -> f64 {
        let raw = BASE_PRIORITY
            + self.mastery
            + self.recency
            + self.difficulty
            + self.repetition
            + self.success_rate;
        raw.clamp(0.0, MAX_PRIORITY)
    }
}

/// Priority in `[0, 100]` of showing `question` next.
///
/// ```
/// # use practice_core::model::{Difficulty, QuestionDraft, QuestionId};
/// # use practice_core::priority::score_priority;
/// # use practice_core::time::fixed_now;
/// let question = QuestionDraft::new("Rust", "q", "a", Difficulty::Medium)
///     .validate(fixed_now())
///     .unwrap()
///     .assign_id(QuestionId::new(1));
/// assert_eq!(score_priority(&question, None, false, fixed_now()), 85.0);
/// assert_eq!(score_priority(&question, None, true, fixed_now()), 55.0);
/// ```
#[must_use]
pub fn score_priority(
    question: &Question,
    progress: Option<&TopicProgress>,
    recently_attempted: bool,
    now: DateTime<Utc>,
) -> f64 {
    PriorityBreakdown::compute(question, progress, recently_attempted, now).total()
}

//
// ─── RANKING ───────────────────────────────────────────────────────────────────
//

/// A question with the score and topic mastery used to rank it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredQuestion {
    pub question: Question,
    pub priority: f64,
    /// Topic mastery, 0 for topics without progress.
    pub mastery_level: f64,
    pub breakdown: PriorityBreakdown,
}

fn ranking_order(a: &ScoredQuestion, b: &ScoredQuestion) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| a.mastery_level.total_cmp(&b.mastery_level))
}

/// Order candidates by priority descending, then topic mastery ascending.
///
/// The sort is stable, so remaining ties keep their input order.
pub fn rank(candidates: &mut [ScoredQuestion]) {
    candidates.sort_by(ranking_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LearnerId, QuestionDraft, QuestionId, Topic};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn question(id: u64, topic: &str, difficulty: Difficulty) -> Question {
        QuestionDraft::new(topic, "prompt", "answer", difficulty)
            .validate(fixed_now())
            .unwrap()
            .assign_id(QuestionId::new(id))
    }

    fn progress(mastery: f64, days_ago: i64, total: u32, correct: u32) -> TopicProgress {
        TopicProgress::from_persisted(
            LearnerId::random(),
            Topic::new("Rust").unwrap(),
            mastery,
            fixed_now() - Duration::days(days_ago),
            total,
            correct,
        )
        .unwrap()
    }

    fn scored(id: u64, priority: f64, mastery_level: f64) -> ScoredQuestion {
        let question = question(id, "Rust", Difficulty::Easy);
        let breakdown = PriorityBreakdown::compute(&question, None, false, fixed_now());
        ScoredQuestion {
            question,
            priority,
            mastery_level,
            breakdown,
        }
    }

    #[test]
    fn new_topic_medium_question_scores_85() {
        let q = question(1, "Rust", Difficulty::Medium);
        assert_eq!(score_priority(&q, None, false, fixed_now()), 85.0);
        assert_eq!(score_priority(&q, None, true, fixed_now()), 55.0);
    }

    #[test]
    fn difficulty_adds_expected_bonus() {
        let now = fixed_now();
        assert_eq!(score_priority(&question(1, "Rust", Difficulty::Easy), None, false, now), 80.0);
        assert_eq!(score_priority(&question(1, "Rust", Difficulty::Hard), None, false, now), 90.0);
    }

    #[test]
    fn factors_accumulate_for_practised_topic() {
        let now = fixed_now();
        // mastery 60 -> +20, 3 days -> +6, hard +15, 5/10 -> neither bonus
        let p = progress(60.0, 3, 10, 5);
        let breakdown =
            PriorityBreakdown::compute(&question(1, "Rust", Difficulty::Hard), Some(&p), false, now);
        assert_eq!(breakdown.mastery, 20.0);
        assert_eq!(breakdown.recency, 6.0);
        assert_eq!(breakdown.difficulty, 15.0);
        assert_eq!(breakdown.repetition, 0.0);
        assert_eq!(breakdown.success_rate, 0.0);
        assert_eq!(breakdown.total(), 91.0);
    }

    #[test]
    fn recency_is_capped_at_twenty() {
        let p = progress(100.0, 40, 10, 10);
        let breakdown =
            PriorityBreakdown::compute(&question(1, "Rust", Difficulty::Easy), Some(&p), false, fixed_now());
        assert_eq!(breakdown.recency, 20.0);
    }

    #[test]
    fn success_rate_shifts_priority() {
        let now = fixed_now();
        let q = question(1, "Rust", Difficulty::Easy);

        let struggling = progress(40.0, 0, 10, 4);
        assert_eq!(
            PriorityBreakdown::compute(&q, Some(&struggling), false, now).success_rate,
            20.0
        );

        let comfortable = progress(90.0, 0, 10, 9);
        assert_eq!(
            PriorityBreakdown::compute(&q, Some(&comfortable), false, now).success_rate,
            -10.0
        );

        let exactly_eighty = progress(80.0, 0, 10, 8);
        assert_eq!(
            PriorityBreakdown::compute(&q, Some(&exactly_eighty), false, now).success_rate,
            0.0
        );
    }

    #[test]
    fn score_is_clamped_to_range() {
        let now = fixed_now();
        // 50 + 50 + 20 + 15 + 20 = 155 -> 100
        let neglected = progress(0.0, 30, 10, 0);
        assert_eq!(
            score_priority(&question(1, "Rust", Difficulty::Hard), Some(&neglected), false, now),
            100.0
        );

        // 50 + 0 + 0 + 5 - 30 - 10 = 15, still inside range
        let mastered = progress(100.0, 0, 10, 10);
        assert_eq!(
            score_priority(&question(1, "Rust", Difficulty::Easy), Some(&mastered), true, now),
            15.0
        );
    }

    #[test]
    fn ranking_breaks_ties_by_lower_mastery_then_input_order() {
        let mut candidates = vec![
            scored(1, 70.0, 40.0),
            scored(2, 90.0, 10.0),
            scored(3, 70.0, 20.0),
            scored(4, 70.0, 20.0),
        ];
        rank(&mut candidates);

        let ids: Vec<u64> = candidates.iter().map(|c| c.question.id.value()).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }
}
