use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopicError {
    #[error("topic cannot be empty")]
    Empty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question answer cannot be empty")]
    EmptyAnswer,

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

//
// ─── TOPIC ─────────────────────────────────────────────────────────────────────
//

/// Free-text category grouping questions (e.g. "JavaScript").
///
/// Stored trimmed; comparisons are exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// # Errors
    ///
    /// Returns `TopicError::Empty` if the name is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, TopicError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TopicError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(QuestionError::UnknownDifficulty(s.to_string())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub topic: String,
    pub prompt: String,
    pub answer: String,
    pub difficulty: Difficulty,
}

impl QuestionDraft {
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        prompt: impl Into<String>,
        answer: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            topic: topic.into(),
            prompt: prompt.into(),
            answer: answer.into(),
            difficulty,
        }
    }

    /// Validate the draft into a `NewQuestion` ready for insertion.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if topic, prompt or answer are blank.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewQuestion, QuestionError> {
        let topic = Topic::new(self.topic)?;
        if self.prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if self.answer.trim().is_empty() {
            return Err(QuestionError::EmptyAnswer);
        }
        Ok(NewQuestion {
            topic,
            prompt: self.prompt,
            answer: self.answer,
            difficulty: self.difficulty,
            created_at: now,
        })
    }
}

/// A validated question that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub topic: Topic,
    pub prompt: String,
    pub answer: String,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

impl NewQuestion {
    #[must_use]
    pub fn assign_id(self, id: QuestionId) -> Question {
        Question {
            id,
            topic: self.topic,
            prompt: self.prompt,
            answer: self.answer,
            difficulty: self.difficulty,
            created_at: self.created_at,
        }
    }
}

/// A question owned by the bank. Shared by all learners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub topic: Topic,
    pub prompt: String,
    pub answer: String,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Re-check the text fields after an edit.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` or `QuestionError::EmptyAnswer` for blank text.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if self.answer.trim().is_empty() {
            return Err(QuestionError::EmptyAnswer);
        }
        Ok(())
    }
}
