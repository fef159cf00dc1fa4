//! Configuration options for the PostgREST client

use std::time::Duration;

use postgrest_fluent_core::DEFAULT_TIMEOUT;

/// Configuration options for the PostgREST client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The database schema
    pub db_schema: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            db_schema: "public".to_string(),
            request_timeout: Some(DEFAULT_TIMEOUT),
            headers: Vec::new(),
        }
    }
}

impl ClientOptions {
    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }
}
