use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use practice_core::mastery::MasteryTier;
use practice_core::model::{LearnerId, ProgressUpdate, Topic, TopicProgress};
use practice_core::priority::{MAX_PRIORITY, recency_bonus};
use storage::repository::{QuestionRepository, StorageError, TopicProgressRepository};

use crate::Clock;
use crate::config::DEFAULT_MAX_WRITE_ATTEMPTS;
use crate::error::{EngineError, StoreResultExt};

//
// ─── RECOMMENDATIONS ───────────────────────────────────────────────────────────
//

/// What to practice next at topic granularity, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRecommendation {
    pub topic: Topic,
    pub priority: f64,
    pub reason: &'static str,
    pub tier: MasteryTier,
    /// `None` for topics the learner has not attempted.
    pub mastery_level: Option<f64>,
    pub question_count: u32,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Folds attempts into per-topic progress and derives topic recommendations.
///
/// Progress writes are read-modify-write. Two writers racing on the same
/// (learner, topic) are resolved optimistically: the update only lands if the
/// stored attempt count is unchanged since the read, otherwise the tracker
/// re-reads and reapplies, up to `max_write_attempts` times. Callers that can
/// serialise writes per learner (one task or queue per learner) never hit a
/// retry.
#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    questions: Arc<dyn QuestionRepository>,
    progress: Arc<dyn TopicProgressRepository>,
    max_write_attempts: u32,
}

enum WriteOutcome {
    Written(TopicProgress),
    Retry(StorageError),
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        progress: Arc<dyn TopicProgressRepository>,
    ) -> Self {
        Self {
            clock,
            questions,
            progress,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    /// Values below 1 are treated as 1.
    #[must_use]
    pub fn with_max_write_attempts(mut self, max_write_attempts: u32) -> Self {
        self.max_write_attempts = max_write_attempts.max(1);
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Count one answer and recompute mastery from the topic's accuracy.
    ///
    /// Creates the progress row on the learner's first attempt in `topic`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` naming `record_attempt_and_update_progress` if the
    /// store fails or the write keeps conflicting.
    pub async fn record_attempt_and_update_progress(
        &self,
        learner_id: LearnerId,
        topic: &Topic,
        is_correct: bool,
    ) -> Result<TopicProgress, EngineError> {
        self.write_progress(
            "record_attempt_and_update_progress",
            learner_id,
            topic,
            ProgressUpdate::Answered { is_correct },
        )
        .await
    }

    /// Count one graded answer and nudge mastery with the continuous rule.
    ///
    /// `performance` is on a 0–1 scale; above 0.5 counts as correct.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` naming `record_graded_attempt` if the store fails
    /// or the write keeps conflicting.
    pub async fn record_graded_attempt(
        &self,
        learner_id: LearnerId,
        topic: &Topic,
        performance: f64,
    ) -> Result<TopicProgress, EngineError> {
        self.write_progress(
            "record_graded_attempt",
            learner_id,
            topic,
            ProgressUpdate::Graded { performance },
        )
        .await
    }

    async fn write_progress(
        &self,
        operation: &'static str,
        learner_id: LearnerId,
        topic: &Topic,
        update: ProgressUpdate,
    ) -> Result<TopicProgress, EngineError> {
        let mut attempt = 1;
        loop {
            match self.try_write(operation, learner_id, topic, update).await? {
                WriteOutcome::Written(progress) => {
                    info!(
                        %learner_id,
                        topic = %topic,
                        mastery = progress.mastery_level(),
                        total = progress.total_attempts(),
                        correct = progress.correct_attempts(),
                        "progress updated"
                    );
                    return Ok(progress);
                }
                WriteOutcome::Retry(err) if attempt < self.max_write_attempts => {
                    warn!(
                        %learner_id,
                        topic = %topic,
                        attempt,
                        error = %err,
                        "progress write raced another writer, retrying"
                    );
                    attempt += 1;
                }
                WriteOutcome::Retry(err) => return Err(EngineError::from_storage(operation, err)),
            }
        }
    }

    async fn try_write(
        &self,
        operation: &'static str,
        learner_id: LearnerId,
        topic: &Topic,
        update: ProgressUpdate,
    ) -> Result<WriteOutcome, EngineError> {
        let now = self.clock.now();
        let existing = self.progress.get_progress(learner_id, topic).await.op(operation)?;

        match existing {
            Some(mut progress) => {
                let expected = progress.total_attempts();
                progress.apply(update, now);
                match self.progress.update_progress(&progress, expected).await {
                    Ok(()) => Ok(WriteOutcome::Written(progress)),
                    Err(StorageError::Conflict) => Ok(WriteOutcome::Retry(StorageError::Conflict)),
                    Err(e) => Err(EngineError::from_storage(operation, e)),
                }
            }
            None => {
                let mut progress = TopicProgress::untouched(learner_id, topic.clone(), now);
                progress.apply(update, now);
                match self.progress.insert_progress(&progress).await {
                    Ok(()) => Ok(WriteOutcome::Written(progress)),
                    // Another writer created the row first.
                    Err(e @ StorageError::ConstraintViolation(_)) => Ok(WriteOutcome::Retry(e)),
                    Err(e) => Err(EngineError::from_storage(operation, e)),
                }
            }
        }
    }

    /// One recommendation per topic in the bank, most urgent first.
    ///
    /// Priority is the tier's base value plus the recency bonus for practised
    /// topics, capped at 100. Equal priorities are ordered by topic name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` naming `get_topic_recommendations` if any read fails.
    pub async fn get_topic_recommendations(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<TopicRecommendation>, EngineError> {
        const OP: &str = "get_topic_recommendations";
        let now = self.clock.now();

        let topics = self.questions.count_by_topic().await.op(OP)?;
        let progress = self.progress.progress_for_learner(learner_id).await.op(OP)?;
        let by_topic: HashMap<&Topic, &TopicProgress> =
            progress.iter().map(|p| (p.topic(), p)).collect();

        let mut recommendations: Vec<TopicRecommendation> = topics
            .into_iter()
            .map(|count| {
                let topic_progress = by_topic.get(&count.topic).copied();
                let tier = topic_progress.map_or(MasteryTier::New, TopicProgress::tier);
                let recency =
                    topic_progress.map_or(0.0, |p| recency_bonus(p.last_practiced(), now));
                TopicRecommendation {
                    priority: (tier.base_priority() + recency).min(MAX_PRIORITY),
                    reason: tier.reason(),
                    tier,
                    mastery_level: topic_progress.map(TopicProgress::mastery_level),
                    question_count: count.questions,
                    topic: count.topic,
                }
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.topic.cmp(&b.topic))
        });

        debug!(%learner_id, topics = recommendations.len(), "built topic recommendations");
        Ok(recommendations)
    }
}
