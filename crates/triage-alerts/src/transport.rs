//! HTTP transport used by the delivery channels.
//!
//! Channels format their payload and hand an [`HttpRequest`] to an
//! [`HttpTransport`]. [`ReqwestTransport`] performs real POSTs;
//! [`RecordingTransport`] keeps requests in memory for dry runs and tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{AlertError, Result};

/// A JSON POST request produced by a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// JSON body.
    pub body: Value,
}

impl HttpRequest {
    /// Creates a request with no extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Adds several headers.
    #[must_use]
    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (k, v) in headers {
            self.headers.insert(k.clone(), v.clone());
        }
        self
    }
}

/// Response status returned by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends JSON requests on behalf of channels.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// POSTs the request and returns the response status.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Transport` if no response was received.
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Transport` if the client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        debug!(url = %request.url, status, "http request completed");
        Ok(HttpResponse { status })
    }
}

/// In-memory transport that records every request.
///
/// Responds with a fixed status, or fails for URLs marked unreachable.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    status: u16,
    unreachable: Arc<Mutex<Vec<String>>>,
}

impl RecordingTransport {
    /// Creates a transport answering 200.
    #[must_use]
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Creates a transport answering `status`.
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            status,
            unreachable: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes requests to `url` fail with a transport error.
    pub fn mark_unreachable(&self, url: impl Into<String>) {
        self.unreachable.lock().push(url.into());
    }

    /// Returns all recorded requests.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns recorded requests sent to `url`.
    #[must_use]
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse> {
        if self.unreachable.lock().iter().any(|u| *u == request.url) {
            return Err(AlertError::Transport(format!(
                "connection refused: {}",
                request.url
            )));
        }
        self.requests.lock().push(request);
        Ok(HttpResponse {
            status: self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn recording_transport_records() {
        let transport = RecordingTransport::new();
        let request = HttpRequest::new("https://hooks.example.com/a", json!({"k": 1}))
            .header("Authorization", "Bearer x");

        let response = transport.post_json(request.clone()).await.unwrap();

        assert!(response.is_success());
        assert_eq!(transport.requests(), vec![request]);
        assert_eq!(transport.requests_to("https://hooks.example.com/a").len(), 1);
        assert!(transport.requests_to("https://other").is_empty());
    }

    #[tokio::test]
    async fn unreachable_url_fails() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable("https://down.example.com");

        let result = transport
            .post_json(HttpRequest::new("https://down.example.com", json!({})))
            .await;

        assert!(matches!(result, Err(AlertError::Transport(_))));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn response_success_range() {
        assert!(HttpResponse { status: 204 }.is_success());
        assert!(!HttpResponse { status: 500 }.is_success());
        assert!(!HttpResponse { status: 302 }.is_success());
    }

    #[test]
    fn reqwest_transport_builds() {
        assert!(ReqwestTransport::new(ReqwestTransport::DEFAULT_TIMEOUT).is_ok());
    }
}
