#![forbid(unsafe_code)]

pub mod config;
pub mod engine_services;
pub mod error;
pub mod practice_session;
pub mod progress_tracker;
pub mod selector;

pub use practice_core::Clock;

pub use config::EngineConfig;
pub use engine_services::EngineServices;
pub use error::{ConfigError, EngineError, StoreResultExt};
pub use practice_session::{AnswerOutcome, PracticeSessionService};
pub use progress_tracker::{ProgressTracker, TopicRecommendation};
pub use selector::{QuestionSelector, ScheduledReview};
