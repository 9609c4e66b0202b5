//! Configuration resolution for dentcode-ai
//!
//! The LLM API key is resolved with ENV → TOML priority. A missing key is not
//! an error: self-hosted OpenAI-compatible servers usually accept anonymous
//! requests.

use dentcode_common::config::TomlConfig;
use tracing::{info, warn};

/// Environment variable carrying the LLM API key
pub const API_KEY_ENV_VAR: &str = "DENTCODE_LLM_API_KEY";

/// Resolve the LLM API key
///
/// **Priority:** ENV → TOML
pub fn resolve_llm_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .llm
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "LLM API key found in multiple sources: environment, TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("LLM API key loaded from environment variable");
        return Some(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("LLM API key loaded from TOML config");
        return Some(key.trim().to_string());
    }

    warn!(
        "LLM API key not configured; requests are sent without authorization. Set {} or [llm] api_key in the config file.",
        API_KEY_ENV_VAR
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
