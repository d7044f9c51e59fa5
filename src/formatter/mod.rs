//! SQL Formatter - turns raw model output into an executable Athena query
//!
//! Stages, in order:
//! 1. extract: pull one statement out of markdown/prose
//! 2. fix: dialect rewrites (functions, aliases, intervals, table qualification)
//! 3. standardize: keyword case and layout
//! 4. validate: the result must parse
//!
//! `fix` and `standardize` are each idempotent.

pub mod dialect;
pub mod extract;
pub mod fix;
pub mod format_log;
pub mod standardize;

use crate::error::AttemptFailure;
use crate::schema::SchemaContext;
use format_log::FormatLog;
use serde::Serialize;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::debug;

/// A formatted query ready for the executor, with the rewrites that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableSql {
    pub sql: String,
    pub log: Vec<String>,
}

pub struct SqlFormatter {
    schema: Arc<SchemaContext>,
}

impl SqlFormatter {
    pub fn new(schema: Arc<SchemaContext>) -> Self {
        Self { schema }
    }

    /// Full pipeline. Any failure is `Unparseable`.
    pub fn format(&self, raw: &str) -> Result<ExecutableSql, AttemptFailure> {
        let statement = extract::extract_statement(raw)
            .ok_or_else(|| AttemptFailure::unparseable("No SQL statement found in model output"))?;

        let mut log = FormatLog::new();
        let fixed = fix::fix(&statement, &self.schema, &mut log);
        let sql = standardize::standardize(&fixed, &mut log);

        validate(&sql)?;

        let log = log.render();
        debug!("Formatted SQL with {} log lines:\n{}", log.len(), sql);
        Ok(ExecutableSql { sql, log })
    }

    pub fn fix(&self, sql: &str) -> String {
        fix::fix(sql, &self.schema, &mut FormatLog::new())
    }

    pub fn standardize(&self, sql: &str) -> String {
        standardize::standardize(sql, &mut FormatLog::new())
    }
}

/// The query must parse as exactly one statement.
pub fn validate(sql: &str) -> Result<(), AttemptFailure> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| AttemptFailure::unparseable(format!("SQL invalid: {}", e)))?;

    match statements.len() {
        1 => Ok(()),
        0 => Err(AttemptFailure::unparseable("SQL invalid: empty statement")),
        n => Err(AttemptFailure::unparseable(format!(
            "SQL invalid: expected one statement, found {}",
            n
        ))),
    }
}
