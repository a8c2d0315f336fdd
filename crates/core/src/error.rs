use thiserror::Error;

use crate::model::{ProgressError, QuestionError, ReviewStateError, SessionStateError};
use crate::settings::SettingsError;

/// Any validation failure raised by the domain model.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    ReviewState(#[from] ReviewStateError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
