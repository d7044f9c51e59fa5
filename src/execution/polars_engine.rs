//! Polars Execution Engine
//!
//! Runs queries in-process against CSV/Parquet extracts of the warehouse
//! tables using the Polars SQL context. Useful for local development and
//! tests; Athena-style qualified names are reduced to bare table names.

use crate::error::{AttemptFailure, FailureKind, Result, SqlAiError};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::ResultSet;
use crate::execution_loop::error_classifier::ErrorClassifier;
use crate::schema::{SchemaContext, TableDescriptor};
use async_trait::async_trait;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Polars execution engine
pub struct PolarsEngine {
    schema: Arc<SchemaContext>,
    data_dir: PathBuf,
    row_limit: Option<usize>,
    classifier: ErrorClassifier,
}

impl PolarsEngine {
    pub fn new(schema: Arc<SchemaContext>, data_dir: PathBuf) -> Self {
        Self {
            schema,
            data_dir,
            row_limit: None,
            classifier: ErrorClassifier::new(),
        }
    }

    /// Cap the number of rows collected per query.
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// `<data_dir>/<database>/<table>.{csv,parquet}`, falling back to `<data_dir>/<table>.*`.
    fn table_file(data_dir: &Path, table: &TableDescriptor) -> Option<PathBuf> {
        let candidates = [
            data_dir.join(&table.database).join(format!("{}.csv", table.name)),
            data_dir.join(&table.database).join(format!("{}.parquet", table.name)),
            data_dir.join(format!("{}.csv", table.name)),
            data_dir.join(format!("{}.parquet", table.name)),
        ];
        candidates.into_iter().find(|p| p.exists())
    }

    fn scan(path: &Path) -> Result<LazyFrame> {
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            LazyCsvReader::new(path)
                .with_has_header(true)
                .with_try_parse_dates(true)
                .with_infer_schema_length(Some(1000))
                .finish()
                .map_err(|e| SqlAiError::Polars(format!("Failed to load CSV {}: {}", path.display(), e)))
        } else {
            LazyFrame::scan_parquet(path, ScanArgsParquet::default())
                .map_err(|e| SqlAiError::Polars(format!("Failed to load Parquet {}: {}", path.display(), e)))
        }
    }

    /// Rewrite qualified table references to the names registered in the SQL context.
    fn adapt_sql(&self, sql: &str) -> String {
        let mut adapted = sql.to_string();
        for table in self.schema.tables() {
            let bare = format!("\"{}\"", table.name);
            adapted = adapted.replace(&table.qualified_name(), &bare);
            adapted = adapted.replace(&format!("\"{}\".\"{}\"", table.database, table.name), &bare);
        }
        adapted
    }

    fn run(
        schema: &SchemaContext,
        data_dir: &Path,
        sql: &str,
        row_limit: Option<usize>,
    ) -> Result<DataFrame> {
        let mut ctx = SQLContext::new();
        for table in schema.tables() {
            match Self::table_file(data_dir, table) {
                Some(path) => ctx.register(&table.name, Self::scan(&path)?),
                None => warn!("No data file for table {} under {}", table.name, data_dir.display()),
            }
        }

        let mut lf = ctx.execute(sql)?;
        if let Some(limit) = row_limit {
            lf = lf.limit(limit as IdxSize);
        }
        Ok(lf.collect()?)
    }
}

#[async_trait]
impl QueryExecutor for PolarsEngine {
    fn name(&self) -> &'static str {
        "polars"
    }

    async fn execute(&self, sql: &str) -> std::result::Result<ResultSet, AttemptFailure> {
        let start_time = std::time::Instant::now();
        let adapted = self.adapt_sql(sql);
        info!("Executing query with Polars: {}", adapted);

        let schema = Arc::clone(&self.schema);
        let data_dir = self.data_dir.clone();
        let row_limit = self.row_limit;

        let df = tokio::task::spawn_blocking(move || Self::run(&schema, &data_dir, &adapted, row_limit))
            .await
            .map_err(|e| {
                AttemptFailure::new(FailureKind::EngineUnavailable, format!("Polars task failed: {}", e))
            })?
            .map_err(|e| self.classifier.failure(e.to_string()))?;

        let result = ResultSet::from_dataframe(&df).map_err(|e| self.classifier.failure(e.to_string()))?;
        info!(
            "✅ Polars returned {} rows in {}ms",
            result.row_count(),
            start_time.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        self.data_dir.is_dir()
    }
}
