//! Scripted completion model
//!
//! Replies are chosen by the first rule whose needle occurs in the prompt.
//! Every prompt is recorded so tests can assert which passes ran.

use dentcode_ai::llm::{CompletionModel, CompletionRequest, LlmError};
use std::sync::Mutex;
use std::time::Duration;

enum Reply {
    Text(String),
    Fail(String),
    Slow(Duration, String),
}

pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Model answering `fallback` when no rule matches
    pub fn new(fallback: &str) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules
            .push((needle.to_string(), Reply::Text(reply.to_string())));
        self
    }

    pub fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules
            .push((needle.to_string(), Reply::Fail(message.to_string())));
        self
    }

    pub fn slow_on(mut self, needle: &str, delay: Duration, reply: &str) -> Self {
        self.rules
            .push((needle.to_string(), Reply::Slow(delay, reply.to_string())));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of recorded prompts containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait::async_trait]
impl CompletionModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply);

        match reply {
            None => Ok(self.fallback.clone()),
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail(message)) => Err(LlmError::Network(message.clone())),
            Some(Reply::Slow(delay, text)) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }
}
