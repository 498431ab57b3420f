use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::environment::Environment;
use crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS;

/// ================================
/// Full SDK configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SdkConfig {
    pub credentials: Credentials,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub logging: Option<LoggingConfig>,
}

impl SdkConfig {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>, environment: Environment) -> Self {
        Self {
            credentials: Credentials {
                consumer_key: consumer_key.into(),
                consumer_secret: consumer_secret.into(),
            },
            environment,
            endpoints: EndpointsConfig::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            logging: None,
        }
    }

    pub fn sandbox(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self::new(consumer_key, consumer_secret, Environment::Sandbox)
    }

    pub fn production(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self::new(consumer_key, consumer_secret, Environment::Production)
    }

    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.oauth_url = Some(url.into());
        self
    }

    /// Token endpoint: the configured override or the environment default.
    pub fn oauth_url(&self) -> &str {
        self.endpoints
            .oauth_url
            .as_deref()
            .unwrap_or_else(|| self.environment.oauth_url())
    }
}

/// Consumer key / secret pair issued by the provider portal.
#[derive(Deserialize, Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EndpointsConfig {
    /// overrides the environment's token endpoint
    pub oauth_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// ================================
/// Token cache
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub kind: CacheKind,
    /// directory for the file cache, `<tmp>/mpesa_cache` when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    File,
    Memory,
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::Compact)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "compact".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}
