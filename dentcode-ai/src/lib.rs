//! dentcode-ai library interface
//!
//! Dental and medical coding assistant: a scenario is classified into CDT and
//! ICD-10 categories, each category fans out to per-subtopic model prompts,
//! and an inspector pass reconciles the candidate codes.
//!
//! The structural core is [`subtopics::SubtopicRegistry`] (concurrent fan-out
//! with per-entry timeout and failure isolation) together with
//! [`normalizer::normalize`].

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod inspector;
pub mod llm;
pub mod normalizer;
pub mod pipeline;
pub mod prompts;
pub mod subtopics;
pub mod topics;
pub mod types;

pub use crate::error::{CoderError, CoderResult};
pub use crate::pipeline::{CodingPipeline, CodingReport};
pub use crate::subtopics::{RegistryOptions, SubtopicRegistry};
pub use crate::types::{
    Activation, ActivationError, ActivationOutcome, AggregateResult, NormalizedRecord,
    RegistrationError,
};
