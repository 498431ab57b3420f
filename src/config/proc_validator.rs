//! Configuration validation with aggregated errors.
//! Every issue is collected so a broken config is reported in one pass.

use reqwest::Url;
use tracing::{error, info};

use crate::config::settings::{LoggingConfig, SdkConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_sdk_config(cfg: &SdkConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    if cfg.credentials.consumer_key.trim().is_empty() {
        errors.push("credentials.consumer_key: consumer key is required".to_string());
    }
    if cfg.credentials.consumer_secret.trim().is_empty() {
        errors.push("credentials.consumer_secret: consumer secret is required".to_string());
    }

    validate_oauth_url(cfg.oauth_url(), &mut errors);

    if cfg.http.timeout_ms == 0 {
        errors.push("http.timeout_ms: must be greater than 0".to_string());
    }

    if let Some(logging) = &cfg.logging {
        validate_logging(logging, &mut errors);
    }

    if errors.is_empty() {
        info!("config validation passed");
        Ok(())
    } else {
        for e in &errors {
            error!("config: {}", e);
        }
        Err(errors)
    }
}

fn validate_oauth_url(url: &str, errors: &mut Vec<String>) {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
            if parsed.query().is_some() {
                errors.push(format!(
                    "endpoints.oauth_url: '{}' must not carry a query string",
                    url
                ));
            }
        }
        Ok(parsed) => errors.push(format!(
            "endpoints.oauth_url: unsupported scheme '{}'",
            parsed.scheme()
        )),
        Err(e) => errors.push(format!("endpoints.oauth_url: invalid url '{}': {}", url, e)),
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "logging.level: '{}' is not one of {:?}",
            logging.level, LOG_LEVELS
        ));
    }
}
