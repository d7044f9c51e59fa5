//! Runtime configuration assembled from the environment (and `.env`).

use crate::answer::AnswerBounds;
use crate::error::{Result, SqlAiError};
use crate::execution::TrinoSettings;
use crate::execution_loop::OrchestratorConfig;
use crate::llm::LlmSettings;
use std::str::FromStr;
use std::time::Duration;

pub const MAX_TOKENS_LIMIT: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct SqlAiConfig {
    pub llm: LlmSettings,
    pub orchestrator: OrchestratorConfig,
    pub answer_bounds: AnswerBounds,
    /// Answers read better with more sampling freedom than SQL generation.
    pub answer_temperature: f32,
    pub trino: TrinoSettings,
}

impl SqlAiConfig {
    /// Parse the environment without range checks, so callers can apply
    /// overrides before calling [`SqlAiConfig::validate`].
    pub fn read_env() -> Result<Self> {
        Self::read_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self::read_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn read_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let llm_defaults = LlmSettings::default();
        let orchestrator_defaults = OrchestratorConfig::default();
        let bounds_defaults = AnswerBounds::default();

        let llm = LlmSettings {
            api_key: lookup("OPENAI_API_KEY").unwrap_or_default(),
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(llm_defaults.base_url),
            model: lookup("SQL_AI_MODEL").unwrap_or(llm_defaults.model),
            max_tokens: parse(&lookup, "SQL_AI_MAX_TOKENS", llm_defaults.max_tokens)?,
            temperature: parse(&lookup, "SQL_AI_TEMPERATURE", llm_defaults.temperature)?,
            request_timeout: llm_defaults.request_timeout,
        };

        let orchestrator = OrchestratorConfig {
            max_retries: parse(&lookup, "SQL_AI_MAX_RETRIES", orchestrator_defaults.max_retries)?,
            model_timeout: Duration::from_secs(parse(
                &lookup,
                "SQL_AI_MODEL_TIMEOUT_SECS",
                orchestrator_defaults.model_timeout.as_secs(),
            )?),
            execution_timeout: Duration::from_secs(parse(
                &lookup,
                "SQL_AI_EXECUTION_TIMEOUT_SECS",
                orchestrator_defaults.execution_timeout.as_secs(),
            )?),
        };

        let answer_bounds = AnswerBounds {
            max_rows: parse(&lookup, "SQL_AI_ANSWER_MAX_ROWS", bounds_defaults.max_rows)?,
            max_chars: parse(&lookup, "SQL_AI_ANSWER_MAX_CHARS", bounds_defaults.max_chars)?,
        };

        let trino_defaults = TrinoSettings::default();
        let trino = TrinoSettings {
            coordinator_url: lookup("TRINO_COORDINATOR_URL").unwrap_or(trino_defaults.coordinator_url),
            catalog: lookup("TRINO_CATALOG").unwrap_or(trino_defaults.catalog),
            schema: lookup("TRINO_SCHEMA").unwrap_or(trino_defaults.schema),
            user: lookup("TRINO_USER").unwrap_or(trino_defaults.user),
            poll_interval: trino_defaults.poll_interval,
        };

        Ok(Self {
            llm,
            orchestrator,
            answer_bounds,
            answer_temperature: parse(&lookup, "SQL_AI_ANSWER_TEMPERATURE", 0.7)?,
            trino,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;

        if self.llm.max_tokens < 1 || self.llm.max_tokens > MAX_TOKENS_LIMIT {
            return Err(SqlAiError::Config(format!(
                "max_tokens must be between 1 and {}, got {}",
                MAX_TOKENS_LIMIT, self.llm.max_tokens
            )));
        }
        for (name, t) in [("temperature", self.llm.temperature), ("answer temperature", self.answer_temperature)] {
            if !(0.0..=2.0).contains(&t) {
                return Err(SqlAiError::Config(format!("{} must be between 0 and 2, got {}", name, t)));
            }
        }
        if self.answer_bounds.max_rows == 0 || self.answer_bounds.max_chars == 0 {
            return Err(SqlAiError::Config("answer bounds must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SqlAiError::Config(format!("Invalid {}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<SqlAiConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SqlAiConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.orchestrator.max_retries, 3);
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.answer_temperature, 0.7);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SQL_AI_MAX_RETRIES", "5"),
            ("SQL_AI_MODEL_TIMEOUT_SECS", "10"),
            ("SQL_AI_MODEL", "gpt-4o-mini"),
            ("TRINO_CATALOG", "hive"),
        ])
        .unwrap();
        assert_eq!(config.orchestrator.max_retries, 5);
        assert_eq!(config.orchestrator.model_timeout, Duration::from_secs(10));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.trino.catalog, "hive");
    }

    #[test]
    fn test_validation() {
        assert!(config(&[("SQL_AI_MAX_RETRIES", "0")]).is_err());
        assert!(config(&[("SQL_AI_MAX_TOKENS", "0")]).is_err());
        assert!(config(&[("SQL_AI_MAX_TOKENS", "10001")]).is_err());
        assert!(config(&[("SQL_AI_MAX_TOKENS", "10000")]).is_ok());
        assert!(config(&[("SQL_AI_MAX_RETRIES", "three")]).is_err());
    }

    #[test]
    fn test_override_before_validation() {
        let mut config = SqlAiConfig::read_lookup(|key| (key == "SQL_AI_MAX_RETRIES").then(|| "0".to_string())).unwrap();
        assert!(config.validate().is_err());

        config.orchestrator.max_retries = 2;
        assert!(config.validate().is_ok());
    }
}
