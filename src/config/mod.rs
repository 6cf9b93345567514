pub mod validation;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for crate::error::StreamError {
    fn from(err: ConfigError) -> Self {
        crate::error::StreamError::Config(err.to_string())
    }
}

/// Upstream channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<String>,
    /// Extra headers configured for the channel. Also consulted for
    /// per-channel feature toggles such as `X-Thinking-To-Content`.
    #[serde(default)]
    pub headers: FxHashMap<String, String>,
    /// Re-encode every stream frame instead of forwarding upstream bytes.
    #[serde(default)]
    pub stream_escape_json: bool,
    /// Upstream accepts `stream_options.include_usage`.
    #[serde(default)]
    pub support_stream_options: bool,
    /// Free-form channel argument; used as `reasoning_effort` for `o3` models.
    #[serde(default)]
    pub other_arg: String,
}

impl ChannelConfig {
    /// Case-insensitive lookup in the configured header map.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_stream_queue_capacity")]
    pub stream_queue_capacity: usize,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_stream_queue_capacity() -> usize {
    crate::stream::DEFAULT_QUEUE_CAPACITY
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stream_queue_capacity: default_stream_queue_capacity(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl AppConfig {
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// First channel that lists `model`, if any.
    #[must_use]
    pub fn channel_for_model(&self, model: &str) -> Option<&ChannelConfig> {
        self.channels
            .iter()
            .find(|channel| channel.models.iter().any(|m| m == model))
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
