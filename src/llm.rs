use crate::error::{ModelError, Result, SqlAiError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Anything that turns a prompt into generated text.
///
/// Implementations are expected to be unreliable: the orchestrator treats
/// every error as a failed attempt.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError>;
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            max_tokens: 2000,
            temperature: 0.1,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// OpenAI-compatible chat-completions client.
pub struct LlmClient {
    settings: LlmSettings,
    system_prompt: Option<String>,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SqlAiError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            system_prompt: None,
            client,
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Same connection pool and settings, different sampling temperature.
    pub fn with_temperature(&self, temperature: f32) -> Self {
        let mut settings = self.settings.clone();
        settings.temperature = temperature;
        Self {
            settings,
            system_prompt: self.system_prompt.clone(),
            client: self.client.clone(),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(format!("LLM API call timed out: {}", e))
    } else {
        ModelError::Unavailable(format!("LLM API call failed: {}", e))
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        debug!("Calling {} with a {} char prompt", self.settings.model, prompt.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Unavailable(format!(
                "LLM API returned status {}: {}",
                status, text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(map_transport_error)?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ModelError::Unavailable("No content in LLM response".to_string()))?;

        Ok(content.trim().to_string())
    }
}
