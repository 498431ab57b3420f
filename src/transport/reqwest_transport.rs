use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::transport::{HttpResponse, HttpTransport, TransportError};
use crate::utils::constants::USER_AGENT;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Client with a total per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(&self, url: &str, request: RequestBuilder) -> Result<HttpResponse, TransportError> {
        let response = request.send().await.map_err(|e| map_error(url, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| map_error(url, e))?;
        debug!("{} responded with {}", url, status);
        Ok(HttpResponse::new(status, body))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
        let request = self.client.get(url).headers(headers.clone());
        self.execute(url, request).await
    }

    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &HeaderMap,
    ) -> Result<HttpResponse, TransportError> {
        let request = self.client.post(url).headers(headers.clone()).json(body);
        self.execute(url, request).await
    }
}

fn map_error(url: &str, err: reqwest::Error) -> TransportError {
    let url = url.to_owned();
    if err.is_timeout() {
        TransportError::Timeout { url }
    } else if err.is_connect() {
        TransportError::Connect {
            url,
            message: err.to_string(),
        }
    } else {
        TransportError::Request {
            url,
            message: err.to_string(),
        }
    }
}
