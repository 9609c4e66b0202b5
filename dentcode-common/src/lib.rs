//! # dentcode Common Library
//!
//! Shared code for the dentcode crates:
//! - Error type used across crate boundaries
//! - TOML bootstrap configuration and config file resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
