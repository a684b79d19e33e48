//! Language-model client.
//!
//! [`ChatCompletionsClient`] talks to any OpenAI-compatible
//! `POST {base_url}/chat/completions` endpoint (Groq by default). Each
//! call sends a single user message and returns the first choice's
//! content unmodified. There is no streaming and no retry: a failed call
//! is reported once.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::LlmConfig;
use crate::error::{NotReadyReason, RagError, Result};

/// Completes a prompt. Implementations must be safe to share across
/// concurrent requests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    /// Builds a client from config, reading the credential from
    /// `[llm].api_key_env`. A missing or blank credential is reported as
    /// [`NotReadyReason::MissingCredentials`].
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            RagError::NotReady(NotReadyReason::MissingCredentials {
                env_var: config.api_key_env.clone(),
            })
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RagError::GenerationFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::GenerationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "language model API error {}: {}",
                status, body_text
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RagError::GenerationFailed(format!("invalid response: {}", e)))?;
        parse_completion(parsed)
    }
}

fn parse_completion(response: CompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| RagError::GenerationFailed("response contained no choices".to_string()))
}
