use std::time::Duration;

use async_trait::async_trait;
use common::scene::SceneError;
use reqwest::Client;
use serde_json::{Value, json};

use crate::config::LlmConfig;

/// Hosted language model that answers in JSON.
#[async_trait]
pub trait SceneModel: Send + Sync {
    /// Send a system prompt and a user message; return the raw text answer.
    async fn generate_json(&self, system: &str, user: &str) -> Result<String, SceneError>;
}

/// Gemini `generateContent` client with JSON response mode.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SceneModel for GeminiClient {
    async fn generate_json(&self, system: &str, user: &str) -> Result<String, SceneError> {
        if self.api_key.is_empty() {
            return Err(SceneError::Upstream("LLM API key is not configured".into()));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "systemInstruction": {"parts": [{"text": system}]},
                "contents": [{"role": "user", "parts": [{"text": user}]}],
                "generationConfig": {"responseMimeType": "application/json"}
            }))
            .send()
            .await
            .map_err(|e| SceneError::Upstream(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| SceneError::Upstream(format!("unreadable response: {e}")))?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(SceneError::Upstream(format!("HTTP {status}: {message}")));
        }

        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| SceneError::Upstream("response has no text candidate".into()))?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scene model responded"
        );
        Ok(text.to_string())
    }
}
