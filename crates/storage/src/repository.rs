use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::model::{
    Attempt, AttemptId, Difficulty, LearnerId, NewAttempt, NewQuestion, Question, QuestionId,
    RecentAttempt, ReviewState, Session, SessionId, Topic, TopicProgress,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// An optimistic write lost a race: the row changed since it was read.
    #[error("row changed since it was read")]
    Conflict,

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Number of questions filed under one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicCount {
    pub topic: Topic,
    pub questions: u32,
}

/// Question bank contract.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// All questions, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be read.
    async fn list_questions(&self) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be read.
    async fn questions_by_topic(&self, topic: &Topic) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be read.
    async fn questions_by_difficulty(
        &self,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be read. A missing question is `Ok(None)`.
    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn insert_question(&self, question: NewQuestion) -> Result<QuestionId, StorageError>;

    /// Replace an existing question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no question has that id.
    async fn update_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Delete a question and its per-learner review schedules.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or
    /// `StorageError::ConstraintViolation` if attempts still reference it.
    async fn delete_question(&self, id: QuestionId) -> Result<(), StorageError>;

    /// Question counts grouped by topic, ordered by topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be read.
    async fn count_by_topic(&self) -> Result<Vec<TopicCount>, StorageError>;
}

/// Append-only attempt log.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::ConstraintViolation` if the session or question does not exist.
    async fn append_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, StorageError>;

    /// Attempts of one session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the log cannot be read.
    async fn attempts_for_session(&self, session_id: SessionId)
    -> Result<Vec<Attempt>, StorageError>;

    /// The learner's latest `limit` attempts across sessions, newest first,
    /// joined with each question's topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the log cannot be read.
    async fn recent_attempts(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<RecentAttempt>, StorageError>;
}

/// Per-(learner, topic) progress rows.
#[async_trait]
pub trait TopicProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be read. A missing row is `Ok(None)`.
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        topic: &Topic,
    ) -> Result<Option<TopicProgress>, StorageError>;

    /// All of a learner's progress rows, ordered by topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn progress_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<TopicProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::ConstraintViolation` if a row for the same
    /// (learner, topic) already exists.
    async fn insert_progress(&self, progress: &TopicProgress) -> Result<(), StorageError>;

    /// Overwrite a row only if its stored `total_attempts` still equals
    /// `expected_total_attempts`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the row moved on, or
    /// `StorageError::NotFound` if it does not exist.
    async fn update_progress(
        &self,
        progress: &TopicProgress,
        expected_total_attempts: u32,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn create_session(
        &self,
        learner_id: LearnerId,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be read. A missing session is `Ok(None)`.
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// Persist counters and completion time, but only onto an open session
    /// whose stored `total_answers` still equals `expected_total_answers`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored session moved on or was
    /// closed, or `StorageError::NotFound` if it does not exist.
    async fn update_session(
        &self,
        session: &Session,
        expected_total_answers: u32,
    ) -> Result<(), StorageError>;
}

/// Per-(learner, question) spaced-repetition schedules.
#[async_trait]
pub trait ReviewStateRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be read. A missing row is `Ok(None)`.
    async fn get_review_state(
        &self,
        learner_id: LearnerId,
        question_id: QuestionId,
    ) -> Result<Option<ReviewState>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::ConstraintViolation` if the question does not exist.
    async fn upsert_review_state(&self, state: &ReviewState) -> Result<(), StorageError>;

    /// Schedules with `next_review_at <= now`, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn due_review_states(
        &self,
        learner_id: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewState>, StorageError>;
}

/// Every row one submitted answer touches, with the versions it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerWrite {
    pub attempt: NewAttempt,
    /// The session with this answer already counted.
    pub session: Session,
    pub expected_session_answers: u32,
    pub progress: TopicProgress,
    /// Stored `total_attempts`, or `None` if the learner had no row for the topic.
    pub expected_progress_attempts: Option<u32>,
    pub review: ReviewState,
    /// Stored `review_count`, or `None` if the question was never reviewed.
    pub expected_review_count: Option<u32>,
}

/// Commits an answer atomically: either every row lands or none does.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Append the attempt and store session counters, topic progress and the
    /// review schedule in one unit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if any row no longer matches the
    /// version it was derived from (or the session was closed),
    /// `StorageError::NotFound` if the session is gone, or
    /// `StorageError::ConstraintViolation` if the question does not exist.
    async fn commit_answer(&self, write: &AnswerWrite) -> Result<AttemptId, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct Tables {
    questions: BTreeMap<QuestionId, Question>,
    sessions: BTreeMap<SessionId, Session>,
    attempts: Vec<Attempt>,
    progress: BTreeMap<(LearnerId, Topic), TopicProgress>,
    review_states: BTreeMap<(LearnerId, QuestionId), ReviewState>,
    last_question_id: u64,
    last_session_id: u64,
    last_attempt_id: u64,
}

/// In-memory implementation of every repository, for tests and prototyping.
///
/// Enforces the same uniqueness, reference and compare-and-swap rules as the
/// `SQLite` adapter. `set_offline(true)` makes every call fail with
/// `StorageError::Unavailable`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("in-memory store is offline".into()));
        }
        self.tables
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn list_questions(&self) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.questions.values().cloned().collect())
    }

    async fn questions_by_topic(&self, topic: &Topic) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .questions
            .values()
            .filter(|q| &q.topic == topic)
            .cloned()
            .collect())
    }

    async fn questions_by_difficulty(
        &self,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .questions
            .values()
            .filter(|q| q.difficulty == difficulty)
            .cloned()
            .collect())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.questions.get(&id).cloned())
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<QuestionId, StorageError> {
        let mut guard = self.lock()?;
        guard.last_question_id += 1;
        let id = QuestionId::new(guard.last_question_id);
        guard.questions.insert(id, question.assign_id(id));
        Ok(id)
    }

    async fn update_question(&self, question: &Question) -> Result<(), StorageError> {
        question
            .validate()
            .map_err(|e| StorageError::ConstraintViolation(e.to_string()))?;
        let mut guard = self.lock()?;
        let slot = guard
            .questions
            .get_mut(&question.id)
            .ok_or(StorageError::NotFound)?;
        *slot = question.clone();
        Ok(())
    }

    async fn delete_question(&self, id: QuestionId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.questions.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        if guard.attempts.iter().any(|a| a.question_id == id) {
            return Err(StorageError::ConstraintViolation(format!(
                "question {id} is referenced by attempts"
            )));
        }
        guard.questions.remove(&id);
        guard.review_states.retain(|(_, question_id), _| *question_id != id);
        Ok(())
    }

    async fn count_by_topic(&self) -> Result<Vec<TopicCount>, StorageError> {
        let guard = self.lock()?;
        let mut counts: BTreeMap<Topic, u32> = BTreeMap::new();
        for question in guard.questions.values() {
            *counts.entry(question.topic.clone()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(topic, questions)| TopicCount { topic, questions })
            .collect())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sessions.contains_key(&attempt.session_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "session {} does not exist",
                attempt.session_id
            )));
        }
        if !guard.questions.contains_key(&attempt.question_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "question {} does not exist",
                attempt.question_id
            )));
        }
        guard.last_attempt_id += 1;
        let id = AttemptId::new(guard.last_attempt_id);
        guard.attempts.push(attempt.assign_id(id));
        Ok(id)
    }

    async fn attempts_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.lock()?;
        let mut attempts: Vec<Attempt> = guard
            .attempts
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| (a.attempted_at, a.id));
        Ok(attempts)
    }

    async fn recent_attempts(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<RecentAttempt>, StorageError> {
        let guard = self.lock()?;
        let mut owned: Vec<&Attempt> = guard
            .attempts
            .iter()
            .filter(|a| {
                guard
                    .sessions
                    .get(&a.session_id)
                    .is_some_and(|s| s.learner_id() == learner_id)
            })
            .collect();
        owned.sort_by(|a, b| {
            b.attempted_at
                .cmp(&a.attempted_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(owned
            .into_iter()
            .filter_map(|a| {
                guard.questions.get(&a.question_id).map(|q| RecentAttempt {
                    question_id: a.question_id,
                    topic: q.topic.clone(),
                    is_correct: a.is_correct,
                    attempted_at: a.attempted_at,
                })
            })
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl TopicProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        topic: &Topic,
    ) -> Result<Option<TopicProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.progress.get(&(learner_id, topic.clone())).cloned())
    }

    async fn progress_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<TopicProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .progress
            .values()
            .filter(|p| p.learner_id() == learner_id)
            .cloned()
            .collect())
    }

    async fn insert_progress(&self, progress: &TopicProgress) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let key = (progress.learner_id(), progress.topic().clone());
        if guard.progress.contains_key(&key) {
            return Err(StorageError::ConstraintViolation(format!(
                "progress for learner {} in topic {} already exists",
                progress.learner_id(),
                progress.topic()
            )));
        }
        guard.progress.insert(key, progress.clone());
        Ok(())
    }

    async fn update_progress(
        &self,
        progress: &TopicProgress,
        expected_total_attempts: u32,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let key = (progress.learner_id(), progress.topic().clone());
        let slot = guard.progress.get_mut(&key).ok_or(StorageError::NotFound)?;
        if slot.total_attempts() != expected_total_attempts {
            return Err(StorageError::Conflict);
        }
        *slot = progress.clone();
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(
        &self,
        learner_id: LearnerId,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StorageError> {
        let mut guard = self.lock()?;
        guard.last_session_id += 1;
        let session = Session::start(SessionId::new(guard.last_session_id), learner_id, started_at);
        guard.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.sessions.get(&id).cloned())
    }

    async fn update_session(
        &self,
        session: &Session,
        expected_total_answers: u32,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .sessions
            .get_mut(&session.id())
            .ok_or(StorageError::NotFound)?;
        if slot.is_completed() || slot.total_answers() != expected_total_answers {
            return Err(StorageError::Conflict);
        }
        *slot = session.clone();
        Ok(())
    }
}

#[async_trait]
impl ReviewStateRepository for InMemoryRepository {
    async fn get_review_state(
        &self,
        learner_id: LearnerId,
        question_id: QuestionId,
    ) -> Result<Option<ReviewState>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.review_states.get(&(learner_id, question_id)).cloned())
    }

    async fn upsert_review_state(&self, state: &ReviewState) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.questions.contains_key(&state.question_id()) {
            return Err(StorageError::ConstraintViolation(format!(
                "question {} does not exist",
                state.question_id()
            )));
        }
        guard
            .review_states
            .insert((state.learner_id(), state.question_id()), state.clone());
        Ok(())
    }

    async fn due_review_states(
        &self,
        learner_id: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewState>, StorageError> {
        let guard = self.lock()?;
        let mut due: Vec<ReviewState> = guard
            .review_states
            .values()
            .filter(|s| s.learner_id() == learner_id && s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| (s.next_review_at(), s.question_id()));
        Ok(due)
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn commit_answer(&self, write: &AnswerWrite) -> Result<AttemptId, StorageError> {
        let mut guard = self.lock()?;
        let tables = &mut *guard;

        let session_id = write.session.id();
        let stored = tables.sessions.get(&session_id).ok_or(StorageError::NotFound)?;
        if stored.is_completed() || stored.total_answers() != write.expected_session_answers {
            return Err(StorageError::Conflict);
        }
        if write.attempt.session_id != session_id {
            return Err(StorageError::ConstraintViolation(format!(
                "attempt does not belong to session {session_id}"
            )));
        }
        if !tables.questions.contains_key(&write.attempt.question_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "question {} does not exist",
                write.attempt.question_id
            )));
        }

        let progress_key = (write.progress.learner_id(), write.progress.topic().clone());
        let stored_progress = tables
            .progress
            .get(&progress_key)
            .map(TopicProgress::total_attempts);
        if stored_progress != write.expected_progress_attempts {
            return Err(StorageError::Conflict);
        }

        let review_key = (write.review.learner_id(), write.review.question_id());
        let stored_review = tables
            .review_states
            .get(&review_key)
            .map(ReviewState::review_count);
        if stored_review != write.expected_review_count {
            return Err(StorageError::Conflict);
        }

        tables.last_attempt_id += 1;
        let attempt_id = AttemptId::new(tables.last_attempt_id);
        tables.attempts.push(write.attempt.clone().assign_id(attempt_id));
        tables.sessions.insert(session_id, write.session.clone());
        tables.progress.insert(progress_key, write.progress.clone());
        tables.review_states.insert(review_key, write.review.clone());
        Ok(attempt_id)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Bundles every repository behind trait objects so backends can be swapped.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub progress: Arc<dyn TopicProgressRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub review_states: Arc<dyn ReviewStateRepository>,
    pub answers: Arc<dyn AnswerRepository>,
}

impl Storage {
    /// Share one backend across all repository slots.
    #[must_use]
    pub fn from_backend<R>(backend: R) -> Self
    where
        R: QuestionRepository
            + AttemptRepository
            + TopicProgressRepository
            + SessionRepository
            + ReviewStateRepository
            + AnswerRepository
            + Clone
            + 'static,
    {
        Self {
            questions: Arc::new(backend.clone()),
            attempts: Arc::new(backend.clone()),
            progress: Arc::new(backend.clone()),
            sessions: Arc::new(backend.clone()),
            review_states: Arc::new(backend.clone()),
            answers: Arc::new(backend),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use practice_core::model::QuestionDraft;
    use practice_core::time::fixed_now;

    fn draft(topic: &str, difficulty: Difficulty) -> NewQuestion {
        QuestionDraft::new(topic, "prompt", "answer", difficulty)
            .validate(fixed_now())
            .unwrap()
    }

    fn topic(name: &str) -> Topic {
        Topic::new(name).unwrap()
    }

    #[tokio::test]
    async fn question_queries_filter_and_group() {
        let repo = InMemoryRepository::new();
        repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        repo.insert_question(draft("Rust", Difficulty::Hard)).await.unwrap();
        repo.insert_question(draft("Go", Difficulty::Hard)).await.unwrap();

        assert_eq!(repo.list_questions().await.unwrap().len(), 3);
        assert_eq!(repo.questions_by_topic(&topic("Rust")).await.unwrap().len(), 2);
        assert_eq!(
            repo.questions_by_difficulty(Difficulty::Hard).await.unwrap().len(),
            2
        );

        let counts = repo.count_by_topic().await.unwrap();
        assert_eq!(
            counts,
            vec![
                TopicCount { topic: topic("Go"), questions: 1 },
                TopicCount { topic: topic("Rust"), questions: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn update_and_delete_require_existing_question() {
        let repo = InMemoryRepository::new();
        let id = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();

        let mut question = repo.get_question(id).await.unwrap().unwrap();
        question.prompt = "edited".into();
        repo.update_question(&question).await.unwrap();
        assert_eq!(repo.get_question(id).await.unwrap().unwrap().prompt, "edited");

        repo.delete_question(id).await.unwrap();
        assert!(repo.get_question(id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_question(id).await,
            Err(StorageError::NotFound)
        ));
        assert!(matches!(
            repo.update_question(&question).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn edits_cannot_blank_question_text() {
        let repo = InMemoryRepository::new();
        let id = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();

        let mut question = repo.get_question(id).await.unwrap().unwrap();
        question.prompt = "   ".into();
        assert!(matches!(
            repo.update_question(&question).await,
            Err(StorageError::ConstraintViolation(_))
        ));
        assert_eq!(repo.get_question(id).await.unwrap().unwrap().prompt, "prompt");
    }

    #[tokio::test]
    async fn session_update_is_compare_and_swap() {
        let repo = InMemoryRepository::new();
        let session = repo.create_session(LearnerId::random(), fixed_now()).await.unwrap();

        let mut answered = session.clone();
        answered.record_answer(true).unwrap();
        repo.update_session(&answered, 0).await.unwrap();
        assert!(matches!(
            repo.update_session(&answered, 0).await,
            Err(StorageError::Conflict)
        ));

        let mut closed = answered.clone();
        closed.complete(fixed_now()).unwrap();
        repo.update_session(&closed, 1).await.unwrap();
        assert!(matches!(
            repo.update_session(&closed, 1).await,
            Err(StorageError::Conflict)
        ));

        let stranger = Session::start(SessionId::new(42), LearnerId::random(), fixed_now());
        assert!(matches!(
            repo.update_session(&stranger, 0).await,
            Err(StorageError::NotFound)
        ));
    }

    fn answer_write(
        session: &Session,
        question_id: QuestionId,
        progress: Option<&TopicProgress>,
        review: Option<&ReviewState>,
    ) -> AnswerWrite {
        let now = fixed_now();
        let learner = session.learner_id();
        let mut next_session = session.clone();
        next_session.record_answer(true).unwrap();
        let mut next_progress = progress
            .cloned()
            .unwrap_or_else(|| TopicProgress::untouched(learner, topic("Rust"), now));
        next_progress.apply(practice_core::model::ProgressUpdate::Answered { is_correct: true }, now);
        let mut next_review = review
            .cloned()
            .unwrap_or_else(|| ReviewState::unseen(learner, question_id, now));
        next_review.apply_review(1.0, now);

        AnswerWrite {
            attempt: NewAttempt::new(session.id(), question_id, true, None, now),
            expected_session_answers: session.total_answers(),
            session: next_session,
            expected_progress_attempts: progress.map(TopicProgress::total_attempts),
            progress: next_progress,
            expected_review_count: review.map(ReviewState::review_count),
            review: next_review,
        }
    }

    #[tokio::test]
    async fn committed_answer_writes_every_row() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::random();
        let q = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        let session = repo.create_session(learner, fixed_now()).await.unwrap();

        let write = answer_write(&session, q, None, None);
        let attempt_id = repo.commit_answer(&write).await.unwrap();

        let attempts = repo.attempts_for_session(session.id()).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].id, attempt_id);
        assert_eq!(repo.get_session(session.id()).await.unwrap().unwrap().total_answers(), 1);
        assert_eq!(
            repo.get_progress(learner, &topic("Rust")).await.unwrap().unwrap().total_attempts(),
            1
        );
        assert_eq!(
            repo.get_review_state(learner, q).await.unwrap().unwrap().review_count(),
            1
        );
    }

    #[tokio::test]
    async fn stale_answer_commit_writes_nothing() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::random();
        let q = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        let session = repo.create_session(learner, fixed_now()).await.unwrap();

        // Another writer created the progress row after it was read as missing.
        let mut progress = TopicProgress::untouched(learner, topic("Rust"), fixed_now());
        progress.apply(practice_core::model::ProgressUpdate::Answered { is_correct: false }, fixed_now());
        repo.insert_progress(&progress).await.unwrap();
        assert!(matches!(
            repo.commit_answer(&answer_write(&session, q, None, None)).await,
            Err(StorageError::Conflict)
        ));

        // The review schedule moved on since it was read.
        let mut review = ReviewState::unseen(learner, q, fixed_now());
        review.apply_review(1.0, fixed_now());
        repo.upsert_review_state(&review).await.unwrap();
        let stale_review = ReviewState::unseen(learner, q, fixed_now());
        assert!(matches!(
            repo.commit_answer(&answer_write(&session, q, Some(&progress), Some(&stale_review)))
                .await,
            Err(StorageError::Conflict)
        ));

        assert!(repo.attempts_for_session(session.id()).await.unwrap().is_empty());
        assert_eq!(repo.get_session(session.id()).await.unwrap().unwrap().total_answers(), 0);
        assert_eq!(
            repo.get_progress(learner, &topic("Rust")).await.unwrap().unwrap().total_attempts(),
            1
        );
        assert_eq!(
            repo.get_review_state(learner, q).await.unwrap().unwrap().review_count(),
            1
        );

        repo.commit_answer(&answer_write(&session, q, Some(&progress), Some(&review)))
            .await
            .unwrap();
        assert!(matches!(
            repo.commit_answer(&answer_write(&session, q, Some(&progress), Some(&review)))
                .await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn attempts_require_session_and_question() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::random();
        let question_id = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        let session = repo.create_session(learner, fixed_now()).await.unwrap();

        let missing_session = NewAttempt::new(SessionId::new(99), question_id, true, None, fixed_now());
        assert!(matches!(
            repo.append_attempt(missing_session).await,
            Err(StorageError::ConstraintViolation(_))
        ));

        let missing_question =
            NewAttempt::new(session.id(), QuestionId::new(99), true, None, fixed_now());
        assert!(matches!(
            repo.append_attempt(missing_question).await,
            Err(StorageError::ConstraintViolation(_))
        ));

        repo.append_attempt(NewAttempt::new(session.id(), question_id, true, None, fixed_now()))
            .await
            .unwrap();
        assert!(matches!(
            repo.delete_question(question_id).await,
            Err(StorageError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn recent_attempts_are_newest_first_and_scoped_to_learner() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::random();
        let other = LearnerId::random();
        let q1 = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        let q2 = repo.insert_question(draft("Go", Difficulty::Easy)).await.unwrap();

        let mine = repo.create_session(learner, fixed_now()).await.unwrap();
        let theirs = repo.create_session(other, fixed_now()).await.unwrap();

        let now = fixed_now();
        repo.append_attempt(NewAttempt::new(mine.id(), q1, true, None, now)).await.unwrap();
        repo.append_attempt(NewAttempt::new(mine.id(), q2, false, None, now + Duration::minutes(1)))
            .await
            .unwrap();
        repo.append_attempt(NewAttempt::new(theirs.id(), q1, true, None, now + Duration::minutes(2)))
            .await
            .unwrap();

        let recent = repo.recent_attempts(learner, 20).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question_id, q2);
        assert_eq!(recent[0].topic, topic("Go"));
        assert_eq!(recent[1].question_id, q1);

        let limited = repo.recent_attempts(learner, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].question_id, q2);
    }

    #[tokio::test]
    async fn progress_insert_is_unique_and_update_is_compare_and_swap() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::random();
        let now = fixed_now();

        let mut progress = TopicProgress::untouched(learner, topic("Rust"), now);
        progress.apply(practice_core::model::ProgressUpdate::Answered { is_correct: true }, now);
        repo.insert_progress(&progress).await.unwrap();
        assert!(matches!(
            repo.insert_progress(&progress).await,
            Err(StorageError::ConstraintViolation(_))
        ));

        let mut next = progress.clone();
        next.apply(practice_core::model::ProgressUpdate::Answered { is_correct: false }, now);
        assert!(matches!(
            repo.update_progress(&next, 0).await,
            Err(StorageError::Conflict)
        ));
        repo.update_progress(&next, 1).await.unwrap();

        let stored = repo.get_progress(learner, &topic("Rust")).await.unwrap().unwrap();
        assert_eq!(stored.total_attempts(), 2);

        let stranger = TopicProgress::untouched(LearnerId::random(), topic("Rust"), now);
        assert!(matches!(
            repo.update_progress(&stranger, 0).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn due_review_states_are_sorted_by_due_time() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::random();
        let now = fixed_now();
        let q1 = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        let q2 = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();
        let q3 = repo.insert_question(draft("Rust", Difficulty::Easy)).await.unwrap();

        let state = |q, due: DateTime<Utc>| {
            ReviewState::from_persisted(learner, q, 2.5, 1, 1, 1, now - Duration::days(3), due)
                .unwrap()
        };
        repo.upsert_review_state(&state(q1, now - Duration::hours(1))).await.unwrap();
        repo.upsert_review_state(&state(q2, now - Duration::days(1))).await.unwrap();
        repo.upsert_review_state(&state(q3, now + Duration::days(1))).await.unwrap();

        let due = repo.due_review_states(learner, now).await.unwrap();
        let ids: Vec<QuestionId> = due.iter().map(ReviewState::question_id).collect();
        assert_eq!(ids, vec![q2, q1]);

        let orphan = state(QuestionId::new(404), now);
        assert!(matches!(
            repo.upsert_review_state(&orphan).await,
            Err(StorageError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let repo = InMemoryRepository::new();
        repo.set_offline(true);
        assert!(matches!(
            repo.list_questions().await,
            Err(StorageError::Unavailable(_))
        ));
        repo.set_offline(false);
        assert!(repo.list_questions().await.unwrap().is_empty());
    }
}
