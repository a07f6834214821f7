//! Outgoing HTTP transport.
//!
//! The core only builds [`PreparedRequest`]s; sending them is delegated to a
//! [`Transport`] so that tests and embedders can swap the network layer.
//! Retry and backoff, if wanted, belong in a custom implementation.

use crate::error::{AppError, Result};
use crate::tools::request::PreparedRequest;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

/// Raw response as received, before any status interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON, or as a JSON string when it is not JSON.
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request. Any HTTP status is a successful transport result;
    /// only network failures and timeouts are errors.
    async fn send(&self, request: &PreparedRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

fn header_map(request: &PreparedRequest) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::Validation(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::Validation(format!("Invalid header value for '{}': {}", name.as_str(), e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| AppError::Validation(format!("Invalid HTTP method '{}'", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(header_map(request)?)
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = std::time::Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Transport(format!(
                    "Request to {} timed out after {}ms",
                    request.url,
                    self.timeout.as_millis()
                ))
            } else {
                AppError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "HTTP request completed"
        );

        Ok(TransportResponse { status, body })
    }
}
