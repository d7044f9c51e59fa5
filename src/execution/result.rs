//! Result Set - Standardized tabular result from execution engines

use crate::error::{AttemptFailure, Result, SqlAiError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Ordered rows with a shared column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as `column -> value` records, in column order.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &serde_json::Value)>> {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }

    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = Vec::with_capacity(df.height());

        for row_idx in 0..df.height() {
            let mut row = Vec::with_capacity(columns.len());
            for series in df.get_columns() {
                row.push(series_to_json_value(series, row_idx)?);
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }
}

/// What a single attempt produced at the execution step.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success { rows: ResultSet },
    Failure(AttemptFailure),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match self {
            ExecutionOutcome::Failure(f) => Some(f),
            ExecutionOutcome::Success { .. } => None,
        }
    }
}

fn series_to_json_value(series: &Series, row_idx: usize) -> Result<serde_json::Value> {
    let any_val = series
        .get(row_idx)
        .map_err(|e| SqlAiError::Execution(format!("Failed to get value: {}", e)))?;

    match any_val {
        AnyValue::Null => Ok(serde_json::Value::Null),
        AnyValue::Boolean(b) => Ok(serde_json::Value::Bool(b)),
        AnyValue::String(s) => Ok(serde_json::Value::String(s.to_string())),
        AnyValue::Int8(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::Int16(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::Int32(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::Int64(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::UInt8(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::UInt16(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::UInt32(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::UInt64(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::Float32(f) => Ok(serde_json::Number::from_f64(f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        AnyValue::Float64(f) => Ok(serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        other => Ok(serde_json::Value::String(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_dataframe_keeps_column_order_and_nulls() {
        let df = df![
            "film" => ["Toy Story", "Cars"],
            "run_time" => [Some(81i64), None]
        ]
        .unwrap();
        let result = ResultSet::from_dataframe(&df).unwrap();
        assert_eq!(result.columns, vec!["film", "run_time"]);
        assert_eq!(result.rows[0], vec![json!("Toy Story"), json!(81)]);
        assert_eq!(result.rows[1][1], serde_json::Value::Null);
    }

    #[test]
    fn test_records_pair_columns_with_values() {
        let result = ResultSet::new(vec!["count".to_string()], vec![vec![json!(42)]]);
        let records: Vec<_> = result.records().collect();
        assert_eq!(records[0], vec![("count", &json!(42))]);
    }
}
