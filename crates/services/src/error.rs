//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::model::{QuestionId, SessionId, SessionStateError};
use practice_core::settings::SettingsError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the engine services.
///
/// Store failures carry the name of the operation that hit them, so callers can
/// tell "which query failed" without parsing messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("{operation}: record not found")]
    NotFound { operation: &'static str },

    #[error("{operation}: constraint violation")]
    ConstraintViolation {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("{operation}: concurrent write kept conflicting")]
    WriteConflict { operation: &'static str },

    #[error("{operation}: store unavailable")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("{operation}: storage failure")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("session {0} does not exist")]
    UnknownSession(SessionId),

    #[error("question {0} does not exist")]
    UnknownQuestion(QuestionId),

    #[error(transparent)]
    Session(#[from] SessionStateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

impl EngineError {
    /// Wrap a store error with the operation that produced it.
    #[must_use]
    pub fn from_storage(operation: &'static str, source: StorageError) -> Self {
        match source {
            StorageError::NotFound => EngineError::NotFound { operation },
            StorageError::Conflict => EngineError::WriteConflict { operation },
            source @ StorageError::ConstraintViolation(_) => {
                EngineError::ConstraintViolation { operation, source }
            }
            source @ StorageError::Unavailable(_) => {
                EngineError::StoreUnavailable { operation, source }
            }
            source => EngineError::Storage { operation, source },
        }
    }

    /// Operation name for store-originated errors.
    #[must_use]
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            EngineError::NotFound { operation }
            | EngineError::WriteConflict { operation }
            | EngineError::ConstraintViolation { operation, .. }
            | EngineError::StoreUnavailable { operation, .. }
            | EngineError::Storage { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

/// Attach an operation name to repository results.
pub trait StoreResultExt<T> {
    /// # Errors
    ///
    /// Converts the `StorageError` into the matching `EngineError` variant.
    fn op(self, operation: &'static str) -> Result<T, EngineError>;
}

impl<T> StoreResultExt<T> for Result<T, StorageError> {
    fn op(self, operation: &'static str) -> Result<T, EngineError> {
        self.map_err(|source| EngineError::from_storage(operation, source))
    }
}

/// Errors emitted while building `EngineConfig`.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("max write attempts must be at least 1")]
    ZeroWriteAttempts,
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
