use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use practice_core::model::{
    Attempt, AttemptId, LearnerId, NewAttempt, ProgressUpdate, Question, QuestionId, ReviewState,
    Session, SessionId, TopicProgress, attempt_performance,
};
use storage::repository::{
    AnswerRepository, AnswerWrite, AttemptRepository, QuestionRepository, ReviewStateRepository,
    SessionRepository, Storage, StorageError, TopicProgressRepository,
};

use crate::Clock;
use crate::config::DEFAULT_MAX_WRITE_ATTEMPTS;
use crate::error::{EngineError, StoreResultExt};

/// Everything that changed because of one submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub attempt_id: AttemptId,
    pub session: Session,
    pub progress: TopicProgress,
    pub review: ReviewState,
}

enum AnswerCommit {
    Committed(AnswerOutcome),
    Stale,
}

/// Runs a practice session: attempts, session counters, topic progress and
/// per-question review schedules.
///
/// An answer is read, folded and then committed as one unit, so a failed
/// submission leaves nothing behind. Answers racing on the same session,
/// topic or question are retried from fresh reads, up to `max_write_attempts`.
#[derive(Clone)]
pub struct PracticeSessionService {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn TopicProgressRepository>,
    review_states: Arc<dyn ReviewStateRepository>,
    answers: Arc<dyn AnswerRepository>,
    max_write_attempts: u32,
}

impl PracticeSessionService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            sessions: Arc::clone(&storage.sessions),
            questions: Arc::clone(&storage.questions),
            attempts: Arc::clone(&storage.attempts),
            progress: Arc::clone(&storage.progress),
            review_states: Arc::clone(&storage.review_states),
            answers: Arc::clone(&storage.answers),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    /// Values below 1 are treated as 1.
    #[must_use]
    pub fn with_max_write_attempts(mut self, max_write_attempts: u32) -> Self {
        self.max_write_attempts = max_write_attempts.max(1);
        self
    }

    /// # Errors
    ///
    /// Returns `EngineError` naming `start_session` if the session cannot be stored.
    pub async fn start_session(&self, learner_id: LearnerId) -> Result<Session, EngineError> {
        let session = self
            .sessions
            .create_session(learner_id, self.clock.now())
            .await
            .op("start_session")?;
        info!(%learner_id, session_id = %session.id(), "session started");
        Ok(session)
    }

    /// Record one answer in an open session.
    ///
    /// Appends the attempt, bumps the session counters, updates the learner's
    /// progress in the question's topic and reschedules the question. The
    /// review interval is driven by correctness and response time.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownSession` / `UnknownQuestion` for missing
    /// records, `EngineError::Session` for a completed session,
    /// `EngineError::WriteConflict` if concurrent writers kept winning, or a
    /// store error naming `submit_answer`.
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        is_correct: bool,
        response_time_ms: Option<u32>,
    ) -> Result<AnswerOutcome, EngineError> {
        const OP: &str = "submit_answer";
        let question = self
            .questions
            .get_question(question_id)
            .await
            .op(OP)?
            .ok_or(EngineError::UnknownQuestion(question_id))?;

        let mut attempt = 1;
        loop {
            match self
                .try_answer(session_id, &question, is_correct, response_time_ms)
                .await?
            {
                AnswerCommit::Committed(outcome) => {
                    info!(
                        learner_id = %outcome.session.learner_id(),
                        %session_id,
                        %question_id,
                        is_correct,
                        interval_days = outcome.review.interval_days(),
                        "answer recorded"
                    );
                    return Ok(outcome);
                }
                AnswerCommit::Stale if attempt < self.max_write_attempts => {
                    warn!(%session_id, %question_id, attempt, "answer raced another writer, retrying");
                    attempt += 1;
                }
                AnswerCommit::Stale => return Err(EngineError::WriteConflict { operation: OP }),
            }
        }
    }

    async fn try_answer(
        &self,
        session_id: SessionId,
        question: &Question,
        is_correct: bool,
        response_time_ms: Option<u32>,
    ) -> Result<AnswerCommit, EngineError> {
        const OP: &str = "submit_answer";
        let now = self.clock.now();

        let mut session = self
            .sessions
            .get_session(session_id)
            .await
            .op(OP)?
            .ok_or(EngineError::UnknownSession(session_id))?;
        let expected_session_answers = session.total_answers();
        session.record_answer(is_correct)?;
        let learner_id = session.learner_id();

        let stored_progress = self
            .progress
            .get_progress(learner_id, &question.topic)
            .await
            .op(OP)?;
        let expected_progress_attempts = stored_progress.as_ref().map(TopicProgress::total_attempts);
        let mut progress = stored_progress
            .unwrap_or_else(|| TopicProgress::untouched(learner_id, question.topic.clone(), now));
        progress.apply(ProgressUpdate::Answered { is_correct }, now);

        let stored_review = self
            .review_states
            .get_review_state(learner_id, question.id)
            .await
            .op(OP)?;
        let expected_review_count = stored_review.as_ref().map(ReviewState::review_count);
        let mut review =
            stored_review.unwrap_or_else(|| ReviewState::unseen(learner_id, question.id, now));
        review.apply_review(attempt_performance(is_correct, response_time_ms), now);

        let write = AnswerWrite {
            attempt: NewAttempt::new(session_id, question.id, is_correct, response_time_ms, now),
            session,
            expected_session_answers,
            progress,
            expected_progress_attempts,
            review,
            expected_review_count,
        };

        match self.answers.commit_answer(&write).await {
            Ok(attempt_id) => Ok(AnswerCommit::Committed(AnswerOutcome {
                attempt_id,
                session: write.session,
                progress: write.progress,
                review: write.review,
            })),
            Err(StorageError::Conflict) => Ok(AnswerCommit::Stale),
            Err(e) => Err(EngineError::from_storage(OP, e)),
        }
    }

    /// Close a session at the current time.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownSession` if missing, `EngineError::Session`
    /// if already closed, or a store error naming `complete_session`.
    pub async fn complete_session(&self, session_id: SessionId) -> Result<Session, EngineError> {
        const OP: &str = "complete_session";
        let mut attempt = 1;
        loop {
            let mut session = self
                .sessions
                .get_session(session_id)
                .await
                .op(OP)?
                .ok_or(EngineError::UnknownSession(session_id))?;
            let expected = session.total_answers();
            session.complete(self.clock.now())?;

            match self.sessions.update_session(&session, expected).await {
                Ok(()) => {
                    info!(
                        %session_id,
                        total = session.total_answers(),
                        correct = session.correct_answers(),
                        "session completed"
                    );
                    return Ok(session);
                }
                Err(StorageError::Conflict) if attempt < self.max_write_attempts => {
                    warn!(%session_id, attempt, "session changed while closing, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(EngineError::from_storage(OP, e)),
            }
        }
    }

    /// All attempts of a session in the order they were made.
    ///
    /// # Errors
    ///
    /// Returns a store error naming `session_attempts`.
    pub async fn session_attempts(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, EngineError> {
        self.attempts
            .attempts_for_session(session_id)
            .await
            .op("session_attempts")
    }
}
