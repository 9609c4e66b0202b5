//! Prompt-backed activations
//!
//! A [`PromptActivation`] renders a [`PromptTemplate`] for one topic, sends it
//! to a [`CompletionModel`] with explicit [`GenerationSettings`] and hands the
//! reply back as text for the normalizer.

use crate::llm::{CompletionModel, CompletionRequest, LlmError};
use crate::types::{ActivationOutcome, AsyncActivation};
use dentcode_common::config::LlmConfig;
use std::sync::Arc;
use tracing::debug;

/// System prompt shared by every coding pass
pub const CODER_SYSTEM_PROMPT: &str = "You are an experienced dental and medical \
billing coder. You assign CDT and ICD-10-CM codes strictly from what the \
clinical scenario documents and you never invent procedures.";

/// Default template for one subtopic
pub const SUBTOPIC_TEMPLATE: &str = "\
Topic: {topic} ({code_range})

Scenario:
{scenario}

Decide whether any code in the range {code_range} applies to this scenario.
Answer using exactly these sections:
CODE: <the single best code, or none>
EXPLANATION: <why the code applies, or why none does>
DOUBT: <missing documentation or uncertainty, or none>";

/// Default template for a category overview
///
/// The `CODE` section lists the subtopic ranges worth a closer look.
pub const OVERVIEW_TEMPLATE: &str = "\
Category: {topic} ({code_range})

Scenario:
{scenario}

The category is divided into these subtopic ranges:
{subtopics}

Which subtopic ranges could contain a code for this scenario?
Answer using exactly these sections:
CODE: <comma-separated subtopic ranges copied from the list, or none>
EXPLANATION: <short reasoning>
DOUBT: <uncertainty, or none>";

/// Prompt text with `{scenario}`, `{topic}` and `{code_range}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Template for a single subtopic
    pub fn subtopic() -> Self {
        Self::new(SUBTOPIC_TEMPLATE)
    }

    /// Overview template with the subtopic listing filled in
    pub fn overview<'a>(subtopics: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let listing = subtopics
            .into_iter()
            .map(|(range, name)| format!("- {range}: {name}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(OVERVIEW_TEMPLATE.replace("{subtopics}", &listing))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitute the placeholders
    ///
    /// The scenario is substituted last so braces inside it stay literal.
    pub fn render(&self, scenario: &str, topic: &str, code_range: &str) -> String {
        self.text
            .replace("{topic}", topic)
            .replace("{code_range}", code_range)
            .replace("{scenario}", scenario.trim())
    }
}

/// Sampling settings for one family of prompts
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            system_prompt: Some(CODER_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::default()
        }
    }
}

impl GenerationSettings {
    /// Completion request carrying these settings
    pub fn request(&self, prompt: String) -> CompletionRequest {
        let request = CompletionRequest::new(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        match &self.system_prompt {
            Some(system) => request.with_system(system.clone()),
            None => request,
        }
    }
}

/// Activation that asks a model about one topic
#[derive(Clone)]
pub struct PromptActivation {
    model: Arc<dyn CompletionModel>,
    template: PromptTemplate,
    settings: GenerationSettings,
    topic: String,
    code_range: String,
}

impl PromptActivation {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        template: PromptTemplate,
        settings: GenerationSettings,
        topic: impl Into<String>,
        code_range: impl Into<String>,
    ) -> Self {
        Self {
            model,
            template,
            settings,
            topic: topic.into(),
            code_range: code_range.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn code_range(&self) -> &str {
        &self.code_range
    }

    pub fn render(&self, scenario: &str) -> String {
        self.template.render(scenario, &self.topic, &self.code_range)
    }

    /// Run the prompt and return the raw reply
    pub async fn complete(&self, scenario: &str) -> Result<String, LlmError> {
        let request = self.settings.request(self.render(scenario));
        debug!(
            topic = %self.topic,
            code_range = %self.code_range,
            model = self.model.model_name(),
            "Prompting model"
        );
        self.model.complete(&request).await
    }
}

#[async_trait::async_trait]
impl AsyncActivation for PromptActivation {
    async fn activate(&self, scenario: &str) -> anyhow::Result<ActivationOutcome> {
        let reply = self.complete(scenario).await?;
        Ok(ActivationOutcome::Text(reply))
    }
}

impl std::fmt::Debug for PromptActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptActivation")
            .field("model", &self.model.model_name())
            .field("topic", &self.topic)
            .field("code_range", &self.code_range)
            .finish()
    }
}
