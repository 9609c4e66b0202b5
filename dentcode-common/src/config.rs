//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is a single TOML file per module. Every field has a
//! built-in default, so a missing file (or a missing table inside the file) is
//! never fatal: the module logs a warning and starts with defaults.
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `DENTCODE_CONFIG` environment variable
//! 3. User config directory (`~/.config/dentcode/<module>.toml` on Linux)
//! 4. System config directory (`/etc/dentcode/<module>.toml`, Linux only)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DENTCODE_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Language model backend settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Subtopic activation limits
    #[serde(default)]
    pub activation: ActivationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Language model backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used for classification and subtopic prompts
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Model used for the final inspection pass (falls back to `model`)
    #[serde(default)]
    pub inspector_model: Option<String>,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Upper bound on generated tokens per reply (provider default if absent)
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// API key (the `DENTCODE_LLM_API_KEY` environment variable takes priority)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per request for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            inspector_model: None,
            temperature: 0.0,
            max_tokens: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    /// Model for the inspection pass
    pub fn inspector_model(&self) -> &str {
        self.inspector_model.as_deref().unwrap_or(&self.model)
    }
}

/// Subtopic activation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Per-activation timeout in seconds
    #[serde(default = "default_activation_timeout_secs")]
    pub timeout_secs: u64,

    /// Ceiling on worker threads for blocking activations in one fan-out
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_activation_timeout_secs(),
            max_workers: default_max_workers(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_activation_timeout_secs() -> u64 {
    30
}

fn default_max_workers() -> usize {
    8
}

/// Config file resolver for one module
pub struct ConfigResolver {
    module_name: String,
}

impl ConfigResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Resolve the config file path, if any candidate exists
    ///
    /// An explicit path (CLI or environment) is returned even when it does not
    /// exist, so the caller can report it.
    pub fn resolve(&self, cli_path: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3/4: platform config directories
        self.default_paths().into_iter().find(|p| p.exists())
    }

    /// Platform config file candidates, in priority order
    pub fn default_paths(&self) -> Vec<PathBuf> {
        let file_name = format!("{}.toml", self.module_name);
        let mut paths = Vec::new();

        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("dentcode").join(&file_name));
        }
        if cfg!(target_os = "linux") {
            paths.push(PathBuf::from("/etc/dentcode").join(&file_name));
        }
        paths
    }

    /// Load configuration with graceful degradation
    ///
    /// Missing file: warning + defaults. Unreadable or malformed file: error.
    pub fn load(&self, cli_path: Option<&Path>) -> Result<TomlConfig> {
        match self.resolve(cli_path) {
            Some(path) if path.exists() => {
                let config = load_toml_config(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(TomlConfig::default())
            }
            None => {
                warn!(
                    "No config file for module '{}', using built-in defaults",
                    self.module_name
                );
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config file atomically (temp file + rename)
///
/// The file may hold an API key, so on Unix it is created with mode 0600.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config.toml");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.activation.timeout_secs, 30);
        assert_eq!(config.activation.max_workers, 8);
        assert_eq!(config.llm.inspector_model(), config.llm.model);
    }

    #[test]
    fn test_partial_table_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [llm]
            model = "local-model"
            inspector_model = "big-model"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.inspector_model(), "big-model");
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.activation, ActivationConfig::default());
    }

    #[test]
    fn test_module_name_in_default_paths() {
        let resolver = ConfigResolver::new("dentcode-ai");
        for path in resolver.default_paths() {
            assert!(path.ends_with("dentcode/dentcode-ai.toml"));
        }
    }
}
