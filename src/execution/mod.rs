//! Execution Module - pluggable query engines behind one trait
//!
//! - QueryExecutor trait consumed by the execution loop
//! - ResultSet / ExecutionOutcome shared result types
//! - Engine implementations (Polars for local files, Trino over REST)

pub mod engine;
pub mod result;

pub mod polars_engine;
pub mod trino_engine;

pub use engine::QueryExecutor;
pub use polars_engine::PolarsEngine;
pub use result::{ExecutionOutcome, ResultSet};
pub use trino_engine::{TrinoEngine, TrinoSettings};
