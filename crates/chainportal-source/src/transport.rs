//! The `Transport` trait: raw HTTP exchange with a portal.
//!
//! The client above it owns status handling and retries; a transport only
//! moves bytes. Tests swap in a scripted implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use chainportal_core::error::PortalError;

/// One HTTP response, body fully read.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body as text, lossy, cut to `max` characters for error messages.
    pub fn body_excerpt(&self, max: usize) -> String {
        String::from_utf8_lossy(&self.body).chars().take(max).collect()
    }
}

/// Raw HTTP exchange with a portal.
///
/// Implementations report connection-level failures as
/// [`PortalError::Network`] and every status line as a [`RawResponse`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<RawResponse, PortalError>;

    async fn post(&self, url: &str, body: &Value) -> Result<RawResponse, PortalError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, PortalError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PortalError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http })
    }

    async fn read(url: &str, resp: reqwest::Response) -> Result<RawResponse, PortalError> {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(|e| network(url, e))?;
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn network(url: &str, err: reqwest::Error) -> PortalError {
    PortalError::Network {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, PortalError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        Self::read(url, resp).await
    }

    async fn post(&self, url: &str, body: &Value) -> Result<RawResponse, PortalError> {
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/jsonl")
            .json(body)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        Self::read(url, resp).await
    }
}
