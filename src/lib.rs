pub mod answer;
pub mod config;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod formatter;
pub mod llm;
pub mod prompt;
pub mod schema;

pub use answer::{AnswerBounds, AnswerComposer};
pub use config::SqlAiConfig;
pub use error::{AskError, AttemptFailure, FailureKind, ModelError, Result, SqlAiError};
pub use execution::{ExecutionOutcome, PolarsEngine, QueryExecutor, ResultSet, TrinoEngine, TrinoSettings};
pub use execution_loop::{Answer, ConversationOrchestrator, OrchestratorConfig, QueryOutcome};
pub use formatter::{ExecutableSql, SqlFormatter};
pub use llm::{LlmClient, LlmSettings, ModelClient};
pub use prompt::{DateFilterPromptBuilder, DefaultPromptBuilder, GuidedPromptBuilder, PromptRecord, SqlPromptBuilder};
pub use schema::{ColumnDescriptor, SchemaContext, TableDescriptor};
