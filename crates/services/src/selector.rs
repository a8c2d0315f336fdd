use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use practice_core::model::{LearnerId, Question, QuestionId, ReviewState, Topic, TopicProgress};
use practice_core::priority::{PriorityBreakdown, ScoredQuestion, rank};
use practice_core::settings::SchedulingSettings;
use practice_core::time::whole_days_between;
use storage::repository::{
    AttemptRepository, QuestionRepository, ReviewStateRepository, TopicProgressRepository,
};

use crate::Clock;
use crate::error::{EngineError, StoreResultExt};

/// A question whose per-question review schedule has come due.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledReview {
    pub question: Question,
    pub review: ReviewState,
}

/// Read-only queries that pick what a learner should practice next.
#[derive(Clone)]
pub struct QuestionSelector {
    clock: Clock,
    settings: SchedulingSettings,
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn TopicProgressRepository>,
    review_states: Arc<dyn ReviewStateRepository>,
}

impl QuestionSelector {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        attempts: Arc<dyn AttemptRepository>,
        progress: Arc<dyn TopicProgressRepository>,
        review_states: Arc<dyn ReviewStateRepository>,
    ) -> Self {
        Self {
            clock,
            settings: SchedulingSettings::default(),
            questions,
            attempts,
            progress,
            review_states,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SchedulingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Score the whole bank for `learner_id` and return the `count` best.
    ///
    /// Questions among the learner's latest attempts (see
    /// `SchedulingSettings::recent_window`) are penalised; topics without
    /// progress count as new. Ties fall back to lower topic mastery, then
    /// question id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` naming `get_next_questions` if any read fails.
    pub async fn get_next_questions(
        &self,
        learner_id: LearnerId,
        count: usize,
    ) -> Result<Vec<ScoredQuestion>, EngineError> {
        const OP: &str = "get_next_questions";
        let now = self.clock.now();

        let progress = self.progress.progress_for_learner(learner_id).await.op(OP)?;
        let by_topic: HashMap<&Topic, &TopicProgress> =
            progress.iter().map(|p| (p.topic(), p)).collect();

        let recent: HashSet<QuestionId> = self
            .attempts
            .recent_attempts(learner_id, self.settings.recent_window())
            .await
            .op(OP)?
            .into_iter()
            .map(|a| a.question_id)
            .collect();

        let bank = self.questions.list_questions().await.op(OP)?;
        let bank_size = bank.len();

        let mut scored: Vec<ScoredQuestion> = bank
            .into_iter()
            .map(|question| {
                let topic_progress = by_topic.get(&question.topic).copied();
                let breakdown = PriorityBreakdown::compute(
                    &question,
                    topic_progress,
                    recent.contains(&question.id),
                    now,
                );
                ScoredQuestion {
                    priority: breakdown.total(),
                    mastery_level: topic_progress.map_or(0.0, TopicProgress::mastery_level),
                    question,
                    breakdown,
                }
            })
            .collect();
        rank(&mut scored);
        scored.truncate(count);

        debug!(
            %learner_id,
            bank_size,
            recent = recent.len(),
            returned = scored.len(),
            "ranked candidate questions"
        );
        Ok(scored)
    }

    /// Every question in a topic whose last practice is older than its
    /// mastery-tiered threshold, in bank order.
    ///
    /// Topics the learner never practised are not due here; they surface
    /// through `get_next_questions` as new topics.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` naming `get_questions_for_review` if any read fails.
    pub async fn get_questions_for_review(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<Question>, EngineError> {
        const OP: &str = "get_questions_for_review";
        let now = self.clock.now();

        let progress = self.progress.progress_for_learner(learner_id).await.op(OP)?;
        let due_topics: Vec<&Topic> = progress
            .iter()
            .filter(|p| {
                let days = whole_days_between(p.last_practiced(), now);
                days >= i64::from(self.settings.due_threshold_days(p.mastery_level()))
            })
            .map(TopicProgress::topic)
            .collect();

        let mut due: BTreeMap<QuestionId, Question> = BTreeMap::new();
        for topic in &due_topics {
            for question in self.questions.questions_by_topic(topic).await.op(OP)? {
                due.entry(question.id).or_insert(question);
            }
        }

        debug!(
            %learner_id,
            due_topics = due_topics.len(),
            due_questions = due.len(),
            "collected topic-level review list"
        );
        Ok(due.into_values().collect())
    }

    /// Questions whose own review schedule is due, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` naming `get_scheduled_reviews` if any read fails.
    pub async fn get_scheduled_reviews(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<ScheduledReview>, EngineError> {
        const OP: &str = "get_scheduled_reviews";
        let now = self.clock.now();

        let states = self
            .review_states
            .due_review_states(learner_id, now)
            .await
            .op(OP)?;

        let mut scheduled = Vec::with_capacity(states.len());
        for review in states {
            // Schedules are removed with their question; a miss here is a race with a delete.
            if let Some(question) = self.questions.get_question(review.question_id()).await.op(OP)? {
                scheduled.push(ScheduledReview { question, review });
            }
        }

        debug!(%learner_id, due = scheduled.len(), "collected scheduled reviews");
        Ok(scheduled)
    }
}
