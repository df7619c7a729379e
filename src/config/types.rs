use serde::{Deserialize, Serialize};

use super::{ConfigResult, ConfigValidator};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CLERK_API_URL: &str = "https://api.clerk.com";

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Bind address
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub max_payload_size: usize,
    pub openai: OpenAIConfig,
    pub clerk: ClerkConfig,
    /// Directory for rolling log files; stdout only when unset
    pub log_dir: Option<String>,
    /// trace, debug, info, warn or error
    pub log_level: Option<String>,
    pub json_logs: bool,
    /// Headers checked, in order, for a caller-supplied request id
    pub request_id_headers: Option<Vec<String>>,
}

/// Completion provider settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIConfig {
    /// Absent keys are reported per request, not at startup
    pub api_key: Option<String>,
    pub organization: Option<String>,
    pub base_url: String,
    pub model: String,
    pub connect_timeout_secs: u64,
}

/// Identity provider settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ClerkConfig {
    pub secret_key: String,
    pub api_url: String,
    /// Accepted `azp` claims; empty accepts any
    pub authorized_parties: Vec<String>,
    pub jwks_cache_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_payload_size: 4 * 1024 * 1024,
            openai: OpenAIConfig::default(),
            clerk: ClerkConfig::default(),
            log_dir: None,
            log_level: None,
            json_logs: false,
            request_id_headers: None,
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            organization: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for ClerkConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            api_url: DEFAULT_CLERK_API_URL.to_string(),
            authorized_parties: vec![],
            jwks_cache_ttl_secs: 3600,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("organization", &self.organization)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for ClerkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClerkConfig")
            .field("secret_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("authorized_parties", &self.authorized_parties)
            .field("jwks_cache_ttl_secs", &self.jwks_cache_ttl_secs)
            .finish()
    }
}

impl RelayConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigValidator::validate(self)
    }

    pub fn request_id_headers(&self) -> Vec<String> {
        self.request_id_headers.clone().unwrap_or_else(|| {
            vec![
                "x-request-id".to_string(),
                "x-correlation-id".to_string(),
                "x-trace-id".to_string(),
            ]
        })
    }
}
