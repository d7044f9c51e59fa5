use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlAiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::prelude::PolarsError> for SqlAiError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        SqlAiError::Polars(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SqlAiError>;

/// Failure modes of the model boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("model timed out: {0}")]
    Timeout(String),
}

/// Why a single generate → format → execute attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    ModelUnavailable,
    ModelTimeout,
    Unparseable,
    SyntaxError,
    PermissionDenied,
    Timeout,
    EngineUnavailable,
}

impl FailureKind {
    pub fn is_model_failure(&self) -> bool {
        matches!(self, FailureKind::ModelUnavailable | FailureKind::ModelTimeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ModelUnavailable => write!(f, "ModelUnavailable"),
            FailureKind::ModelTimeout => write!(f, "ModelTimeout"),
            FailureKind::Unparseable => write!(f, "Unparseable"),
            FailureKind::SyntaxError => write!(f, "SyntaxError"),
            FailureKind::PermissionDenied => write!(f, "PermissionDenied"),
            FailureKind::Timeout => write!(f, "Timeout"),
            FailureKind::EngineUnavailable => write!(f, "EngineUnavailable"),
        }
    }
}

/// A per-attempt failure. Recovered by the orchestrator, never surfaced on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unparseable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unparseable, message)
    }
}

impl From<ModelError> for AttemptFailure {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Unavailable(msg) => AttemptFailure::new(FailureKind::ModelUnavailable, msg),
            ModelError::Timeout(msg) => AttemptFailure::new(FailureKind::ModelTimeout, msg),
        }
    }
}

/// Terminal failures returned to the caller of `ask`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AskError {
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Gave up after {attempts} attempts, last failure was {last_kind}: {message}")]
    RetriesExhausted {
        attempts: usize,
        last_kind: FailureKind,
        message: String,
    },

    #[error("Query succeeded after {attempts} attempts but the answer could not be composed: {message}")]
    AnswerCompositionFailed { attempts: usize, message: String },

    #[error("Question cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },
}

impl AskError {
    pub fn attempts(&self) -> usize {
        match self {
            AskError::InvalidQuestion(_) => 0,
            AskError::RetriesExhausted { attempts, .. }
            | AskError::AnswerCompositionFailed { attempts, .. }
            | AskError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AskError::InvalidQuestion(msg) => msg.clone(),
            AskError::RetriesExhausted { message, .. }
            | AskError::AnswerCompositionFailed { message, .. } => message.clone(),
            AskError::Cancelled { .. } => "cancelled by caller".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_maps_to_attempt_failure() {
        let failure: AttemptFailure = ModelError::Timeout("30s elapsed".to_string()).into();
        assert_eq!(failure.kind, FailureKind::ModelTimeout);
        assert_eq!(failure.message, "30s elapsed");
        assert!(failure.kind.is_model_failure());
    }

    #[test]
    fn test_ask_error_carries_attempts_and_message() {
        let err = AskError::RetriesExhausted {
            attempts: 3,
            last_kind: FailureKind::SyntaxError,
            message: "Column 'title' cannot be resolved".to_string(),
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.message(), "Column 'title' cannot be resolved");
        assert!(err.to_string().contains("SyntaxError"));
    }
}
