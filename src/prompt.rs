//! SQL Prompt Builders
//!
//! A prompt is assembled from overridable sections: general context (question
//! plus schema), additional context, general guidelines, additional
//! guidelines and, on retries, the failure of the previous attempt. Variants
//! override the hooks they care about and inherit the rest.

use crate::error::{Result, SqlAiError};
use crate::execution_loop::history::AttemptHistory;
use crate::schema::SchemaContext;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use std::path::Path;

/// A rendered prompt and the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptRecord {
    pub attempt: usize,
    pub text: String,
}

pub const GENERAL_GUIDELINES: &str = r#"
Guidelines:
- Always wrap tables, databases and catalogs in doublequotes ("), UNLESS doing show create table then use backticks (`).
- Query ONLY from the columns, commands or databases listed above.
- Use single quotes ' for all string literals.
- Output ONLY the SQL query (no explanation, no extra text).
- Ensure the query is valid Athena SQL syntax.
- Never use the KEYWORDS: TOP
- When selecting all columns, use the * symbol.
- When filtering to today, use the DATE_TRUNC function to truncate CURRENT_DATE to the day.
- When using the BETWEEN function, compared items must have the same datatype.
- If only table schema has been provided, this is what the user means if they refer to "the table" or "the data".
- When adding multiple where clause conditions separate with " AND ".
- If asked for something like 'how many', this is likely a count query.
- DO NOT use table aliases.
- DO NOT group by using column aliases, instead use the full field expression.
- When calculating durations, always include the time unit in the column name e.g. <duration>_seconds
- When using WITH clauses, apply WHERE filters as early as possible i.e. inside the WITH block.
"#;

pub trait SqlPromptBuilder: Send + Sync {
    fn general_context(&self, question: &str, schema: &SchemaContext) -> String {
        format!(
            "You are an expert Athena SQL generator.\n\n\
             Translate the following user question into a valid Athena SQL query:\n\n\
             Question: {}\n\n\
             When doing so note:\n\
             - the `show create table <table_name>` command produces definitions of tables\n\
             - the \"information_schema\".\"columns\" table has metadata about columns (and their data types) in tables\n\
             - The user is ONLY interested in data/metadata about the following tables, with schemas:\n{}\n",
            question,
            schema.context()
        )
    }

    fn additional_context(&self) -> String {
        String::new()
    }

    fn general_guidelines(&self) -> String {
        GENERAL_GUIDELINES.to_string()
    }

    fn additional_guidelines(&self) -> String {
        String::new()
    }

    /// Feedback from the most recent failed attempt, if any.
    fn retry_context(&self, history: &AttemptHistory) -> Option<String> {
        let last = history.last_failed()?;
        let failure = last.outcome.failure()?;
        let query = last
            .executable_sql
            .as_ref()
            .map(|sql| sql.sql.clone())
            .or_else(|| {
                let raw = last.generated_sql.trim();
                (!raw.is_empty()).then(|| raw.to_string())
            })
            .unwrap_or_else(|| "(no SQL was produced)".to_string());

        Some(format!(
            "\nYour previous attempt (#{}) failed.\n\
             Previous query:\n{}\n\n\
             It failed with {}: {}\n\n\
             Correct the query so that it runs successfully. Do not repeat the same mistake.\n",
            last.prompt.attempt, query, failure.kind, failure.message
        ))
    }

    fn build(&self, question: &str, schema: &SchemaContext, history: &AttemptHistory) -> PromptRecord {
        let mut text = self.general_context(question, schema);
        text.push_str(&self.additional_context());
        text.push_str(&self.general_guidelines());
        text.push_str(&self.additional_guidelines());
        if let Some(retry) = self.retry_context(history) {
            text.push_str(&retry);
        }

        PromptRecord {
            attempt: history.len() + 1,
            text,
        }
    }
}

/// Plain Athena prompt with no domain-specific additions.
#[derive(Debug, Clone, Default)]
pub struct DefaultPromptBuilder;

impl SqlPromptBuilder for DefaultPromptBuilder {}

/// Adds caller-supplied context and guidelines, e.g. per-dataset rules.
#[derive(Debug, Clone, Default)]
pub struct GuidedPromptBuilder {
    context: String,
    guidelines: String,
}

impl GuidedPromptBuilder {
    pub fn new(context: impl Into<String>, guidelines: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            guidelines: guidelines.into(),
        }
    }

    /// Read extra guidelines from a text file, one rule per line.
    pub fn from_guidelines_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SqlAiError::Config(format!("Failed to read guidelines {}: {}", path.display(), e))
        })?;
        Ok(Self::new(String::new(), content))
    }
}

impl SqlPromptBuilder for GuidedPromptBuilder {
    fn additional_context(&self) -> String {
        if self.context.trim().is_empty() {
            return String::new();
        }
        format!("\nAdditional context:\n{}\n", self.context.trim())
    }

    fn additional_guidelines(&self) -> String {
        let rules = self
            .guidelines
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| if l.starts_with('-') { l.to_string() } else { format!("- {}", l) })
            .join("\n");
        if rules.is_empty() {
            return String::new();
        }
        format!("{}\n", rules)
    }
}

/// Forces every query to be bounded by a date filter.
#[derive(Debug, Clone)]
pub struct DateFilterPromptBuilder {
    date_columns: Vec<String>,
    today: NaiveDate,
    default_window_days: u32,
}

impl DateFilterPromptBuilder {
    pub fn new(date_columns: Vec<String>) -> Self {
        Self {
            date_columns,
            today: chrono::Local::now().date_naive(),
            default_window_days: 30,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_default_window_days(mut self, days: u32) -> Self {
        self.default_window_days = days;
        self
    }
}

impl SqlPromptBuilder for DateFilterPromptBuilder {
    fn additional_context(&self) -> String {
        format!("\nToday's date is {}.\n", self.today.format("%Y-%m-%d"))
    }

    fn additional_guidelines(&self) -> String {
        let columns = self.date_columns.iter().map(|c| format!("\"{}\"", c)).join(", ");
        format!(
            "- Every query MUST include a WHERE filter on one of these date columns: {}.\n\
             - If the user does not give a date range, restrict to the last {} days using \
             DATE_ADD('day', -{}, CURRENT_DATE).\n",
            columns, self.default_window_days, self.default_window_days
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AttemptFailure, FailureKind};
    use crate::execution::result::ExecutionOutcome;
    use crate::execution_loop::history::Attempt;
    use crate::formatter::ExecutableSql;
    use crate::schema::{ColumnDescriptor, TableDescriptor};

    fn schema() -> SchemaContext {
        SchemaContext::new(vec![TableDescriptor::new("pixar", "films", "Pixar feature films")
            .with_column(ColumnDescriptor::new("film", "varchar"))])
        .unwrap()
    }

    fn failed_attempt(sql: &str, message: &str) -> Attempt {
        Attempt {
            prompt: PromptRecord {
                attempt: 1,
                text: "first prompt".to_string(),
            },
            generated_sql: sql.to_string(),
            executable_sql: Some(ExecutableSql {
                sql: sql.to_string(),
                log: Vec::new(),
            }),
            outcome: ExecutionOutcome::Failure(AttemptFailure::new(FailureKind::SyntaxError, message)),
        }
    }

    #[test]
    fn test_first_attempt_has_no_retry_context() {
        let record = DefaultPromptBuilder.build("How many films?", &schema(), &AttemptHistory::new());
        assert_eq!(record.attempt, 1);
        assert!(record.text.contains("Question: How many films?"));
        assert!(record.text.contains("Table: films"));
        assert!(!record.text.contains("previous attempt"));
    }

    #[test]
    fn test_retry_includes_failed_query_and_message() {
        let mut history = AttemptHistory::new();
        history.push(failed_attempt(
            "SELECT COUNT(title) FROM films",
            "Column 'title' cannot be resolved",
        ));
        let record = DefaultPromptBuilder.build("How many films?", &schema(), &history);
        assert_eq!(record.attempt, 2);
        assert!(record.text.contains("SELECT COUNT(title) FROM films"));
        assert!(record.text.contains("SyntaxError: Column 'title' cannot be resolved"));
    }

    #[test]
    fn test_retry_without_sql_says_so() {
        let mut history = AttemptHistory::new();
        history.push(Attempt {
            prompt: PromptRecord {
                attempt: 1,
                text: String::new(),
            },
            generated_sql: String::new(),
            executable_sql: None,
            outcome: ExecutionOutcome::Failure(AttemptFailure::new(
                FailureKind::ModelTimeout,
                "no response in 30s",
            )),
        });
        let record = DefaultPromptBuilder.build("q", &schema(), &history);
        assert!(record.text.contains("(no SQL was produced)"));
        assert!(record.text.contains("ModelTimeout"));
    }

    #[test]
    fn test_guided_builder_normalizes_rules() {
        let builder = GuidedPromptBuilder::new("Films are Pixar only.", "Use run_time in minutes\n\n- Never LIMIT counts");
        let record = builder.build("q", &schema(), &AttemptHistory::new());
        assert!(record.text.contains("Additional context:\nFilms are Pixar only."));
        assert!(record.text.contains("- Use run_time in minutes\n- Never LIMIT counts"));
    }

    #[test]
    fn test_date_filter_builder_mentions_columns_and_today() {
        let builder = DateFilterPromptBuilder::new(vec!["release_date".to_string()])
            .with_today(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .with_default_window_days(7);
        let text = builder.build("q", &schema(), &AttemptHistory::new()).text;
        assert!(text.contains("Today's date is 2024-05-01."));
        assert!(text.contains("\"release_date\""));
        assert!(text.contains("DATE_ADD('day', -7, CURRENT_DATE)"));
    }
}
