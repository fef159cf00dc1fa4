//! Immutable per-request configuration

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use std::time::Duration;
use url::Url;

use crate::error::PostgrestError;

/// Default request timeout applied when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Base URL, schema, default headers and timeout of a PostgREST endpoint.
///
/// Every table operation takes its own copy, so header or auth overrides on one
/// builder are never visible to the client or to other builders.
#[derive(Debug, Clone)]
pub struct RequestContext {
    base_url: String,
    schema: Option<String>,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl RequestContext {
    /// Create a context for the PostgREST root at `base_url`
    pub fn new(base_url: &str) -> Result<Self, PostgrestError> {
        if Url::parse(base_url)?.cannot_be_a_base() {
            return Err(PostgrestError::invalid(format!(
                "Base URL cannot take a path: {}",
                base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            schema: None,
            headers,
            timeout: Some(DEFAULT_TIMEOUT),
        })
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| PostgrestError::invalid(format!("Invalid header value: {}", value)))?;
        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| PostgrestError::invalid(format!("Invalid header name: {}", key)))?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Send `apikey` with every request
    pub fn with_api_key(self, api_key: &str) -> Result<Self, PostgrestError> {
        self.with_header("apikey", api_key)
    }

    /// 認証トークンを設定
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header(AUTHORIZATION.as_str(), &format!("Bearer {}", token))
    }

    /// Target a schema other than the server's default one
    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    /// `None` leaves the transport's own timeout in charge
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment
    pub(crate) fn url_for<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                PostgrestError::invalid(format!("Base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
