//! Transport module
//!
//! Minimal request/response abstraction the token manager talks through.
//! `ReqwestTransport` is the production implementation; tests plug in
//! scripted transports.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

/// Fields providers use for an error description, in lookup order.
const ERROR_FIELDS: [&str; 6] = [
    "errorMessage",
    "error_description",
    "error",
    "message",
    "Error",
    "errorCode",
];

/// The request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request to '{url}' timed out")]
    Timeout { url: String },
    #[error("connection to '{url}' failed: {message}")]
    Connect { url: String, message: String },
    #[error("request to '{url}' failed: {message}")]
    Request { url: String, message: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, TransportError>;

    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &HeaderMap,
    ) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as JSON; `None` for empty or non-JSON bodies.
    pub fn json_value(&self) -> Option<Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Top-level JSON field, if the body is a JSON object containing it.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.json_value()
            .and_then(|value| value.get(name).cloned())
    }

    /// Human readable failure description, empty for successful responses.
    pub fn error_message(&self) -> String {
        if self.is_success() {
            return String::new();
        }
        ERROR_FIELDS
            .iter()
            .find_map(|name| self.field(name).map(|value| value_to_string(&value)))
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    self.status.as_u16(),
                    self.status.canonical_reason().unwrap_or("Unknown Status")
                )
            })
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_owned(),
        other => other.to_string(),
    }
}
