//! Error types for dentcode-ai

use crate::llm::LlmError;
use crate::types::RegistrationError;
use thiserror::Error;

/// Pipeline-level error
#[derive(Debug, Error)]
pub enum CoderError {
    /// Scenario is blank
    #[error("Scenario is empty")]
    EmptyScenario,

    /// `clarify` was called but the last verdict asked nothing
    #[error("No clarifying question is pending")]
    NoPendingQuestion,

    /// Classifier or inspector model call failed
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Catalog registration failed at startup
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// dentcode-common error
    #[error("Config error: {0}")]
    Config(#[from] dentcode_common::Error),
}

/// Convenience result type
pub type CoderResult<T> = Result<T, CoderError>;
