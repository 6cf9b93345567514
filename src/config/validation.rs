use std::collections::HashSet;

use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL", "TRACE", "DISABLED",
];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_features(config)?;
    validate_channels(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_features(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is not one of {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    if config.features.stream_queue_capacity == 0 {
        return Err(validation_err(
            "features.stream_queue_capacity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_channels(config: &AppConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for channel in &config.channels {
        if channel.name.trim().is_empty() {
            return Err(validation_err("channel name cannot be empty"));
        }
        if !names.insert(channel.name.as_str()) {
            return Err(validation_err(format!(
                "duplicate channel name '{}'",
                channel.name
            )));
        }
        if !channel.base_url.is_empty()
            && !(channel.base_url.starts_with("http://") || channel.base_url.starts_with("https://"))
        {
            return Err(validation_err(format!(
                "channel '{}' base_url must start with http:// or https://",
                channel.name
            )));
        }
        for (key, value) in &channel.headers {
            if http::HeaderName::from_bytes(key.as_bytes()).is_err() {
                return Err(validation_err(format!(
                    "channel '{}' has invalid header name '{key}'",
                    channel.name
                )));
            }
            if http::HeaderValue::from_str(value).is_err() {
                return Err(validation_err(format!(
                    "channel '{}' has invalid value for header '{key}'",
                    channel.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, FeaturesConfig};

    fn channel(name: &str) -> ChannelConfig {
        ChannelConfig {
            name: name.to_string(),
            base_url: "https://example.com/v1".to_string(),
            ..ChannelConfig::default()
        }
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let config = AppConfig {
            channels: vec![channel("a"), channel("a")],
            ..AppConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate channel name"));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut bad = channel("a");
        bad.headers
            .insert("X Thinking".to_string(), "true".to_string());
        let config = AppConfig {
            channels: vec![bad],
            ..AppConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut bad = channel("a");
        bad.base_url = "ftp://example.com".to_string();
        let config = AppConfig {
            channels: vec![bad],
            ..AppConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_and_capacity_checked() {
        let config = AppConfig {
            features: FeaturesConfig {
                log_level: "verbose".to_string(),
                ..FeaturesConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(validate_config(&config).is_err());

        let config = AppConfig {
            features: FeaturesConfig {
                stream_queue_capacity: 0,
                ..FeaturesConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(validate_config(&config).is_err());

        let config = AppConfig {
            features: FeaturesConfig {
                log_level: "warning".to_string(),
                ..FeaturesConfig::default()
            },
            channels: vec![channel("ok")],
        };
        assert!(validate_config(&config).is_ok());
    }
}
