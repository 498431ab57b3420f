use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::proc_validator;
use crate::config::settings::{CacheKind, LogFormat, LoggingConfig, SdkConfig};
use crate::config::Environment;
use crate::utils::constants::{CACHE_FILE, CACHE_MEMORY};

/// Load and validate config from YAML file
pub fn file_to_config(path: &Path) -> Result<SdkConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config '{}'", path.display()))?;

    let expanded = expand_env_vars(&content);
    parse_config(&expanded)
}

pub fn parse_config(content: &str) -> Result<SdkConfig> {
    let mut config: SdkConfig = serde_yaml::from_str(content)
        .inspect_err(|e| error!("parse config error: {}", e))?;

    // Apply defaults
    if config.logging.is_none() {
        config.logging = Some(LoggingConfig::default());
    }
    validate(config)
}

/// Build the config from `MPESA_*` environment variables.
pub fn env_to_config() -> Result<SdkConfig> {
    let environment = match env::var("MPESA_ENVIRONMENT") {
        Ok(value) => value.parse::<Environment>()?,
        Err(_) => Environment::default(),
    };
    let mut config = SdkConfig::new(
        env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
        env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
        environment,
    );

    config.endpoints.oauth_url = env::var("MPESA_OAUTH_URL").ok().filter(|v| !v.is_empty());
    if let Ok(timeout) = env::var("MPESA_HTTP_TIMEOUT_MS") {
        config.http.timeout_ms = timeout
            .parse()
            .map_err(|e| anyhow!("MPESA_HTTP_TIMEOUT_MS '{}': {}", timeout, e))?;
    }
    if let Ok(kind) = env::var("MPESA_CACHE") {
        config.cache.kind = match kind.to_lowercase().as_str() {
            CACHE_FILE => CacheKind::File,
            CACHE_MEMORY => CacheKind::Memory,
            other => return Err(anyhow!("MPESA_CACHE '{}': use file or memory", other)),
        };
    }
    config.cache.dir = env::var("MPESA_CACHE_DIR").ok().map(PathBuf::from);
    config.logging = Some(LoggingConfig::new(
        env::var("MPESA_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
        LogFormat::from_env(),
    ));

    validate(config)
}

fn validate(config: SdkConfig) -> Result<SdkConfig> {
    debug!("validating config ...");
    proc_validator::validate_sdk_config(&config)
        .map_err(|errors| anyhow!("invalid config: {}", errors.join("; ")))?;
    Ok(config)
}

/// Replace `${VAR}` and `${VAR:default}` with values from the environment.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}
