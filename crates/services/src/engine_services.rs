use std::sync::Arc;

use storage::repository::{QuestionRepository, Storage};

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::practice_session::PracticeSessionService;
use crate::progress_tracker::ProgressTracker;
use crate::selector::QuestionSelector;

/// Assembles the engine services over one `Storage`.
#[derive(Clone)]
pub struct EngineServices {
    questions: Arc<dyn QuestionRepository>,
    selector: Arc<QuestionSelector>,
    tracker: Arc<ProgressTracker>,
    sessions: Arc<PracticeSessionService>,
}

impl EngineServices {
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, config: &EngineConfig) -> Self {
        let selector = QuestionSelector::new(
            clock,
            Arc::clone(&storage.questions),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.review_states),
        )
        .with_settings(config.settings().clone());

        let tracker = ProgressTracker::new(
            clock,
            Arc::clone(&storage.questions),
            Arc::clone(&storage.progress),
        )
        .with_max_write_attempts(config.max_write_attempts());

        let sessions = PracticeSessionService::new(clock, storage)
            .with_max_write_attempts(config.max_write_attempts());

        Self {
            questions: Arc::clone(&storage.questions),
            selector: Arc::new(selector),
            tracker: Arc::new(tracker),
            sessions: Arc::new(sessions),
        }
    }

    /// Build services over a fresh in-memory store.
    #[must_use]
    pub fn in_memory(clock: Clock, config: &EngineConfig) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, config)
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Sqlite` if connecting or migrating fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, config))
    }

    /// The question bank, for administrative edits.
    #[must_use]
    pub fn questions(&self) -> Arc<dyn QuestionRepository> {
        Arc::clone(&self.questions)
    }

    #[must_use]
    pub fn selector(&self) -> Arc<QuestionSelector> {
        Arc::clone(&self.selector)
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<PracticeSessionService> {
        Arc::clone(&self.sessions)
    }
}
