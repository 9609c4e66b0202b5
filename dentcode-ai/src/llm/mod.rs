//! Completion model seam
//!
//! Every LLM pass (classifier, category overviews, subtopic prompts, inspector)
//! talks to a [`CompletionModel`]. The default backend is
//! [`ChatCompletionsClient`], an OpenAI-compatible HTTP client; tests plug in
//! scripted models instead.

mod chat_client;

pub use chat_client::ChatCompletionsClient;

use dentcode_common::config::LlmConfig;
use std::time::Duration;
use thiserror::Error;

/// One completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// LLM backend
#[async_trait::async_trait]
pub trait CompletionModel: Send + Sync {
    /// Model identifier used in logs
    fn model_name(&self) -> &str;

    /// Run one completion and return the reply text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Model transport and protocol failures
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client settings are unusable
    #[error("Invalid LLM configuration: {0}")]
    InvalidConfig(String),

    /// Request never produced an HTTP response
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body was not the expected shape
    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    /// Response carried no content
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Connection settings for [`ChatCompletionsClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl LlmSettings {
    /// Settings from the `[llm]` table, with an already resolved API key
    pub fn from_config(config: &LlmConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// Same connection, different model
    pub fn for_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}
