//! Test Helper Utilities
//!
//! Shared utilities for testing dentcode-ai

pub mod scripted_model;

// Re-export commonly used items
pub use scripted_model::ScriptedModel;
