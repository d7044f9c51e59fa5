//! Execution Engine Trait - the contract between the loop and a query engine

use crate::error::AttemptFailure;
use crate::execution::result::ResultSet;
use async_trait::async_trait;

/// Executes a formatted query and reports either rows or a classified failure.
///
/// Engines never panic or return transport-level errors: every problem is
/// mapped to an [`AttemptFailure`] so the loop can feed it back to the model.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Engine name (e.g. "polars", "trino")
    fn name(&self) -> &'static str;

    async fn execute(&self, sql: &str) -> std::result::Result<ResultSet, AttemptFailure>;

    /// Check if engine is available/healthy
    async fn health_check(&self) -> bool {
        true
    }
}
