//! Core Types and Trait Definitions for dentcode-ai
//!
//! Defines the boundary between the subtopic registry and its collaborators:
//! - **Activation traits:** blocking and async callables that turn a scenario
//!   into an [`ActivationOutcome`]
//! - **Outcome union:** the heterogeneous raw result, normalized immediately
//!   into a [`NormalizedRecord`]
//! - **Aggregate:** the per-call result of a subtopic fan-out
//! - **Error taxonomy:** registration, activation and normalization errors

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Activation Traits
// ============================================================================

/// Synchronous activation function
///
/// Runs on a worker thread so it never blocks the async runtime. Any closure
/// `Fn(&str) -> anyhow::Result<ActivationOutcome>` implements this trait.
pub trait BlockingActivation: Send + Sync {
    fn activate(&self, scenario: &str) -> anyhow::Result<ActivationOutcome>;
}

impl<F> BlockingActivation for F
where
    F: Fn(&str) -> anyhow::Result<ActivationOutcome> + Send + Sync,
{
    fn activate(&self, scenario: &str) -> anyhow::Result<ActivationOutcome> {
        self(scenario)
    }
}

/// Asynchronous activation function
///
/// Runs as its own task on the async runtime.
///
/// # Example
/// ```rust,ignore
/// use dentcode_ai::types::{ActivationOutcome, AsyncActivation};
///
/// struct CleaningPrompt { /* model handle */ }
///
/// #[async_trait::async_trait]
/// impl AsyncActivation for CleaningPrompt {
///     async fn activate(&self, scenario: &str) -> anyhow::Result<ActivationOutcome> {
///         let reply = self.ask_model(scenario).await?;
///         Ok(ActivationOutcome::Text(reply))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AsyncActivation: Send + Sync {
    async fn activate(&self, scenario: &str) -> anyhow::Result<ActivationOutcome>;
}

/// Adapter turning an async closure into an [`AsyncActivation`]
struct AsyncFn<F>(F);

#[async_trait::async_trait]
impl<F, Fut> AsyncActivation for AsyncFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ActivationOutcome>> + Send + 'static,
{
    async fn activate(&self, scenario: &str) -> anyhow::Result<ActivationOutcome> {
        (self.0)(scenario.to_string()).await
    }
}

/// A registered activation function, tagged with how it must be driven
#[derive(Clone)]
pub enum Activation {
    /// Driven on the per-call worker pool
    Blocking(Arc<dyn BlockingActivation>),
    /// Driven as an async task
    Async(Arc<dyn AsyncActivation>),
}

impl Activation {
    /// Wrap a synchronous closure
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<ActivationOutcome> + Send + Sync + 'static,
    {
        Activation::Blocking(Arc::new(f))
    }

    /// Wrap an async closure taking the scenario by value
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ActivationOutcome>> + Send + 'static,
    {
        Activation::Async(Arc::new(AsyncFn(f)))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Activation::Async(_))
    }
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Blocking(_) => write!(f, "Activation::Blocking"),
            Activation::Async(_) => write!(f, "Activation::Async"),
        }
    }
}

// ============================================================================
// Activation Outcome
// ============================================================================

/// Raw result of one activation, before normalization
///
/// `Structured` carries any JSON value; objects use keys drawn from
/// `code`, `codes`, `explanation`, `doubt`, `error`, `raw_data`. A structured
/// value that is not an object is reported as an unexpected type.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivationOutcome {
    /// Nothing to report
    Empty,
    /// Free text, possibly using the `CODE:` / `EXPLANATION:` / `DOUBT:` sections
    Text(String),
    /// Structured payload
    Structured(Value),
}

impl From<String> for ActivationOutcome {
    fn from(text: String) -> Self {
        ActivationOutcome::Text(text)
    }
}

impl From<&str> for ActivationOutcome {
    fn from(text: &str) -> Self {
        ActivationOutcome::Text(text.to_string())
    }
}

impl From<Option<String>> for ActivationOutcome {
    fn from(text: Option<String>) -> Self {
        text.map_or(ActivationOutcome::Empty, ActivationOutcome::Text)
    }
}

impl From<Value> for ActivationOutcome {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ActivationOutcome::Empty,
            Value::String(text) => ActivationOutcome::Text(text),
            other => ActivationOutcome::Structured(other),
        }
    }
}

// ============================================================================
// Normalized Records
// ============================================================================

/// One extracted code with its supporting text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doubt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
}

impl CodeEntry {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.explanation.is_none()
            && self.doubt.is_none()
            && self.raw_data.is_none()
    }
}

/// Canonical record for one subtopic
///
/// `code`, when set, mirrors the first entry of `codes` carrying a usable
/// code. `code_range` is `None` when the subtopic explicitly answered "no
/// code"; otherwise it is the discriminator the entry was registered under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub topic: String,
    pub code_range: Option<String>,
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<CodeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doubt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_topic_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result_dict: Option<Value>,
}

impl NormalizedRecord {
    /// Empty record for a topic
    pub fn new(topic: impl Into<String>, code_range: Option<String>) -> Self {
        Self {
            topic: topic.into(),
            code_range,
            code: None,
            codes: Vec::new(),
            explanation: None,
            doubt: None,
            error: None,
            raw_topic_data: None,
            raw_result_dict: None,
        }
    }

    /// Minimal `{topic, code_range, error}` record
    pub fn error(
        topic: impl Into<String>,
        code_range: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(topic, Some(code_range.into()));
        record.error = Some(error.into());
        record
    }

    /// Whether the record carries anything worth reporting
    pub fn is_meaningful(&self) -> bool {
        !self.codes.is_empty()
            || self.explanation.is_some()
            || self.doubt.is_some()
            || self.error.is_some()
            || self.raw_topic_data.is_some()
    }
}

/// Result of one subtopic fan-out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Records in no particular order
    pub topic_result: Vec<NormalizedRecord>,
    /// Sorted, deduplicated names of entries with meaningful output
    pub activated_subtopics: Vec<String>,
}

impl AggregateResult {
    pub fn is_empty(&self) -> bool {
        self.topic_result.is_empty() && self.activated_subtopics.is_empty()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Registration misuse; fatal at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A blank discriminator can never be selected
    #[error("Discriminator for '{0}' is empty")]
    EmptyDiscriminator(String),

    /// A blank display name cannot be reported
    #[error("Display name for discriminator '{0}' is empty")]
    EmptyDisplayName(String),
}

/// Failure of a single activation; recovered as a per-entry record
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Activation exceeded its time budget
    #[error("Activation timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    /// Activation returned an error
    #[error("Activation failed: {0}")]
    Failed(String),

    /// Activation panicked
    #[error("Activation panicked: {0}")]
    Panicked(String),

    /// The per-call worker pool could not run the activation
    #[error("Worker pool unavailable: {0}")]
    WorkerPool(String),
}

/// Raw outcome did not match any expected shape
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("Unexpected result type: {0}")]
    UnexpectedType(String),

    #[error("Malformed '{field}' field: {reason}")]
    MalformedField { field: String, reason: String },
}

/// JSON type name for diagnostics
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
