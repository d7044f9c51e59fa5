//! Execution Loop
//!
//! Bounded question → SQL → rows retry loop and its supporting types.

pub mod error_classifier;
pub mod history;
pub mod orchestrator;

pub use error_classifier::ErrorClassifier;
pub use history::{Attempt, AttemptHistory};
pub use orchestrator::{Answer, ConversationOrchestrator, LoopState, OrchestratorConfig, QueryOutcome};
