use super::*;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &RelayConfig) -> ConfigResult<()> {
        Self::validate_server_settings(config)?;
        Self::validate_openai(&config.openai)?;
        Self::validate_clerk(&config.clerk)?;
        Ok(())
    }

    fn validate_server_settings(config: &RelayConfig) -> ConfigResult<()> {
        if config.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: config.port.to_string(),
                reason: "Port must be > 0".to_string(),
            });
        }

        if config.max_payload_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_payload_size".to_string(),
                value: config.max_payload_size.to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        if let Some(level) = &config.log_level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "log_level".to_string(),
                    value: level.clone(),
                    reason: format!("Must be one of {}", LOG_LEVELS.join(", ")),
                });
            }
        }

        Ok(())
    }

    fn validate_openai(openai: &OpenAIConfig) -> ConfigResult<()> {
        if openai.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "openai.model".to_string(),
            });
        }
        Self::validate_url("openai.base_url", &openai.base_url)?;

        if openai.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "openai.connect_timeout_secs".to_string(),
                value: openai.connect_timeout_secs.to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_clerk(clerk: &ClerkConfig) -> ConfigResult<()> {
        if clerk.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "clerk.secret_key".to_string(),
            });
        }
        Self::validate_url("clerk.api_url", &clerk.api_url)?;

        if clerk.jwks_cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "clerk.jwks_cache_ttl_secs".to_string(),
                value: clerk.jwks_cache_ttl_secs.to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_url(field: &str, url: &str) -> ConfigResult<()> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: url.to_string(),
                reason: "URL must start with http:// or https://".to_string(),
            });
        }
        Ok(())
    }
}
