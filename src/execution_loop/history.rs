//! Attempt history for one question.

use crate::execution::result::ExecutionOutcome;
use crate::formatter::ExecutableSql;
use crate::prompt::PromptRecord;

/// One generate → format → execute cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub prompt: PromptRecord,
    /// Raw model text; empty when the model call itself failed.
    pub generated_sql: String,
    /// Present only when formatting succeeded.
    pub executable_sql: Option<ExecutableSql>,
    pub outcome: ExecutionOutcome,
}

/// Append-only record of the attempts made for the current question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptHistory {
    attempts: Vec<Attempt>,
}

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// The most recent attempt, but only if it failed.
    pub fn last_failed(&self) -> Option<&Attempt> {
        self.attempts.last().filter(|a| !a.outcome.is_success())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter()
    }
}
