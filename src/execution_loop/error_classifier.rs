//! Error Classifier
//!
//! Maps free-text engine errors onto the per-attempt failure taxonomy.

use crate::error::{AttemptFailure, FailureKind};

/// Error classifier
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an engine error message into the taxonomy
    pub fn classify(&self, message: &str) -> FailureKind {
        let error_msg = message.to_lowercase();

        if error_msg.contains("access denied")
            || error_msg.contains("permission denied")
            || error_msg.contains("not authorized")
            || error_msg.contains("unauthorized")
            || error_msg.contains("forbidden")
        {
            return FailureKind::PermissionDenied;
        }

        if error_msg.contains("timed out")
            || error_msg.contains("timeout")
            || error_msg.contains("exceeded_time_limit")
            || error_msg.contains("time limit")
        {
            return FailureKind::Timeout;
        }

        if error_msg.contains("connection refused")
            || error_msg.contains("unavailable")
            || error_msg.contains("could not connect")
            || error_msg.contains("error sending request")
            || error_msg.contains("service unavailable")
        {
            return FailureKind::EngineUnavailable;
        }

        // Everything else the engine rejects is the query's fault.
        FailureKind::SyntaxError
    }

    pub fn failure(&self, message: impl Into<String>) -> AttemptFailure {
        let message = message.into();
        AttemptFailure::new(self.classify(&message), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_column_not_found() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify("COLUMN_NOT_FOUND: line 1:8: Column 'title' cannot be resolved"),
            FailureKind::SyntaxError
        );
    }

    #[test]
    fn test_classify_permission_denied() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify("Access Denied: Cannot select from table pixar.films"),
            FailureKind::PermissionDenied
        );
    }

    #[test]
    fn test_classify_timeout_and_unavailable() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.classify("Query exceeded maximum time limit of 30.00m"),
            FailureKind::Timeout
        );
        assert_eq!(
            classifier.classify("error sending request for url (http://localhost:8080/v1/statement)"),
            FailureKind::EngineUnavailable
        );
    }

    #[test]
    fn test_failure_keeps_original_message() {
        let failure = ErrorClassifier::new().failure("Table 'cars' does not exist");
        assert_eq!(failure.kind, FailureKind::SyntaxError);
        assert_eq!(failure.message, "Table 'cars' does not exist");
    }
}
