//! Answer Composer
//!
//! Renders the rows that answered a question into a grounding prompt and asks
//! the model for the final natural-language answer. One model call, no retry.

use crate::error::ModelError;
use crate::execution::result::ResultSet;
use crate::llm::ModelClient;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Limits on how much of a result set is put in front of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerBounds {
    pub max_rows: usize,
    pub max_chars: usize,
}

impl Default for AnswerBounds {
    fn default() -> Self {
        Self {
            max_rows: 200,
            max_chars: 20_000,
        }
    }
}

pub struct AnswerComposer {
    model: Arc<dyn ModelClient>,
    bounds: AnswerBounds,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            bounds: AnswerBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: AnswerBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// `col: value, col: value` per row, truncated to the configured bounds.
    pub fn render_rows(&self, rows: &ResultSet) -> String {
        if rows.is_empty() {
            return "No data found.".to_string();
        }

        let mut out = String::from("Here is the query result data:\n");
        let mut shown = 0;
        for record in rows.records() {
            let line = record
                .iter()
                .map(|(column, value)| format!("{}: {}", column, display_value(value)))
                .collect::<Vec<_>>()
                .join(", ");

            if shown >= self.bounds.max_rows || out.len() + line.len() + 1 > self.bounds.max_chars {
                break;
            }
            out.push_str(&line);
            out.push('\n');
            shown += 1;
        }

        let hidden = rows.row_count() - shown;
        if hidden > 0 {
            out.push_str(&format!("... {} more rows not shown\n", hidden));
        }
        out
    }

    pub fn prompt(&self, question: &str, sql: Option<&str>, rows: &ResultSet) -> String {
        let query = sql
            .map(|q| {
                format!(
                    "\nBased on the following query (which you shouldn't share in the output): {}\n",
                    q
                )
            })
            .unwrap_or_default();

        format!(
            "\nYou are a helpful data analyst assistant.\n{}\n\
             Answer the user's question/command:\n\n\
             \"{}\"\n\n\
             Use the below data in your answer:\n{}\n\
             IF the answer contains numbers, round to sensible number of decimal places,\n \
             include units if they exist, and choose normal units for the context.\n\
             Show the number part of the answer in bold.\n\n\
             DO NOT TELL US WHAT YOU DID. JUST ANSWER THE QUESTION.\n",
            query,
            question,
            self.render_rows(rows)
        )
    }

    pub async fn compose(
        &self,
        question: &str,
        sql: Option<&str>,
        rows: &ResultSet,
    ) -> Result<String, ModelError> {
        let prompt = self.prompt(question, sql, rows);
        debug!("Answer prompt is {} chars for {} rows", prompt.len(), rows.row_count());

        let answer = self.model.generate(&prompt).await?;
        info!("✅ Composed answer ({} chars)", answer.len());
        Ok(answer)
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelClient for EchoModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("There are **27** films.".to_string())
        }
    }

    fn composer(bounds: AnswerBounds) -> AnswerComposer {
        AnswerComposer::new(Arc::new(EchoModel {
            prompts: Mutex::new(Vec::new()),
        }))
        .with_bounds(bounds)
    }

    fn films(n: usize) -> ResultSet {
        ResultSet::new(
            vec!["film".to_string(), "year".to_string()],
            (0..n).map(|i| vec![json!(format!("Film {}", i)), json!(1995 + i)]).collect(),
        )
    }

    #[test]
    fn test_empty_rows() {
        let c = composer(AnswerBounds::default());
        assert_eq!(c.render_rows(&ResultSet::empty(vec!["n".to_string()])), "No data found.");
    }

    #[test]
    fn test_rows_rendered_as_pairs() {
        let c = composer(AnswerBounds::default());
        assert_eq!(
            c.render_rows(&films(2)),
            "Here is the query result data:\nfilm: Film 0, year: 1995\nfilm: Film 1, year: 1996\n"
        );
    }

    #[test]
    fn test_row_bound() {
        let c = composer(AnswerBounds {
            max_rows: 2,
            max_chars: 10_000,
        });
        let text = c.render_rows(&films(5));
        assert!(text.contains("Film 1"));
        assert!(!text.contains("Film 2"));
        assert!(text.ends_with("... 3 more rows not shown\n"));
    }

    #[test]
    fn test_char_bound() {
        let c = composer(AnswerBounds {
            max_rows: 1000,
            max_chars: 80,
        });
        let text = c.render_rows(&films(10));
        assert!(text.contains("more rows not shown"));
        assert!(text.lines().count() < 10);
    }

    #[tokio::test]
    async fn test_compose_includes_question_and_sql() {
        let model = Arc::new(EchoModel {
            prompts: Mutex::new(Vec::new()),
        });
        let c = AnswerComposer::new(model.clone());
        let rows = ResultSet::new(vec!["n".to_string()], vec![vec![json!(27)]]);
        let answer = c.compose("How many films?", Some("SELECT COUNT(*) FROM films"), &rows).await.unwrap();

        assert_eq!(answer, "There are **27** films.");
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"How many films?\""));
        assert!(prompts[0].contains("SELECT COUNT(*) FROM films"));
        assert!(prompts[0].contains("n: 27"));
    }
}
