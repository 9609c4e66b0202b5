//! OpenAI-compatible chat completions client
//!
//! Posts `{model, messages, temperature, max_tokens}` to
//! `<base_url>/v1/chat/completions` and returns the first choice's content.
//! Connection failures, timeouts, 429 and 5xx responses are retried with
//! capped exponential backoff.

use super::{CompletionModel, CompletionRequest, LlmError, LlmSettings};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 500;

/// Maximum backoff delay
const MAX_BACKOFF_MS: u64 = 8_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP chat completions backend
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    settings: LlmSettings,
}

impl ChatCompletionsClient {
    /// Validate settings and build the HTTP client
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        if settings.model.trim().is_empty() {
            return Err(LlmError::InvalidConfig("model name is empty".to_string()));
        }

        let base_url = settings.base_url.trim_end_matches('/');
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| LlmError::InvalidConfig(format!("invalid base URL '{}': {}", base_url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LlmError::InvalidConfig(format!(
                "base URL must use http or https, got: {}",
                parsed.scheme()
            )));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(LlmError::InvalidConfig(
                "base URL must not contain credentials".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| LlmError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        let endpoint = format!("{}/v1/chat/completions", base_url);
        info!(endpoint = %endpoint, model = %settings.model, "Chat completions client created");

        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = self.settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            match HeaderValue::from_str(&format!("Bearer {}", key.trim())) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("API key contains characters not allowed in a header; sending without auth"),
            }
        }
        headers
    }

    fn body<'a>(&'a self, request: &CompletionRequest) -> ChatCompletionBody<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatCompletionBody {
            model: &self.settings.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl CompletionModel for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = self.body(request);
        let attempts = self.settings.max_retries.saturating_add(1);
        let mut last_error = LlmError::Network("no attempt made".to_string());
        let mut retry_after = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = retry_after.take().unwrap_or_else(|| calculate_backoff(attempt - 1));
                warn!(
                    model = %self.settings.model,
                    attempt,
                    error = %last_error,
                    "Completion failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            debug!(model = %self.settings.model, attempt, "Sending completion request");

            let response = match self
                .client
                .post(&self.endpoint)
                .headers(self.headers())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if is_retryable_error(&e) => {
                    last_error = LlmError::Network(e.to_string());
                    continue;
                }
                Err(e) => return Err(LlmError::Network(e.to_string())),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: ChatCompletionResponse = response
                    .json()
                    .await
                    .map_err(|e| LlmError::Parse(e.to_string()))?;
                return first_content(parsed);
            }

            retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let api_error = LlmError::Api {
                status: status.as_u16(),
                body,
            };

            if is_retryable_status(status) {
                last_error = api_error;
                continue;
            }

            error!(model = %self.settings.model, error = %api_error, "Completion rejected");
            return Err(api_error);
        }

        error!(
            model = %self.settings.model,
            attempts,
            error = %last_error,
            "Completion failed after all attempts"
        );
        Err(last_error)
    }
}

fn first_content(response: ChatCompletionResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

/// Check if a reqwest error is retryable (transient network issues)
fn is_retryable_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    err.status().map_or(false, is_retryable_status)
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Exponential backoff capped at [`MAX_BACKOFF_MS`]
fn calculate_backoff(attempt: u32) -> Duration {
    let base_delay = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(base_delay.min(MAX_BACKOFF_MS))
}

/// `Retry-After` in whole seconds, capped like regular backoff
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_millis(secs.saturating_mul(1000).min(MAX_BACKOFF_MS)))
}
