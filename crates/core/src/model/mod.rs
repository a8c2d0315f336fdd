mod attempt;
mod ids;
mod progress;
mod question;
mod review;
mod session;

pub use attempt::{Attempt, NewAttempt, RecentAttempt, attempt_performance};
pub use ids::{AttemptId, LearnerId, ParseIdError, QuestionId, SessionId};
pub use progress::{ProgressError, ProgressUpdate, TopicProgress};
pub use question::{Difficulty, NewQuestion, Question, QuestionDraft, QuestionError, Topic, TopicError};
pub use review::{ReviewState, ReviewStateError};
pub use session::{Session, SessionStateError};
