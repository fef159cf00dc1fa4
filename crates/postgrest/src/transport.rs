//! HTTP transport abstraction used to execute built queries

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use std::fmt;
use std::time::Duration;

use crate::error::PostgrestError;

/// A fully assembled outbound request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL including the encoded query string
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// Status, headers and body text of a transport response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Sends one request and returns the raw response.
///
/// Connection pooling, TLS and retries belong to the implementation; errors
/// are handed back to the caller unchanged.
#[async_trait]
pub trait HttpTransport: fmt::Debug + Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PostgrestError>;
}

/// [`HttpTransport`] backed by a `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PostgrestError> {
        let mut req = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers);

        if let Some(body) = request.body {
            req = req.body(body);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
