//! Error types for the PostgREST request builder

use http::StatusCode;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Structured error body returned by PostgREST (`message`, `details`, `hint`, `code`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl PostgrestApiErrorDetails {
    /// Reads the error fields from a decoded JSON body.
    ///
    /// Returns `None` unless the body is a JSON object. Missing fields stay
    /// `None`; non-string values (a numeric `code`, an object in `details`)
    /// are kept as their JSON text.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |name: &str| match object.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        Some(Self {
            code: field("code"),
            message: field("message"),
            details: field("details"),
            hint: field("hint"),
        })
    }
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        if parts.is_empty() {
            return write!(f, "Empty error");
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Error type for every stage of a query: building, sending and decoding
#[derive(Error, Debug)]
pub enum PostgrestError {
    /// The server answered with a structured PostgREST error
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    /// The server answered with an error (or undecodable success) body that
    /// is not a PostgREST error object
    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error(transparent)]
    NetworkError(#[from] reqwest::Error),

    /// Failure reported by a custom [`HttpTransport`](crate::HttpTransport)
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The builder was used with arguments PostgREST cannot express
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A row of a successful response does not match the requested row type
    #[error("Row {index} failed validation: {source}")]
    ValidationError {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl PostgrestError {
    pub(crate) fn invalid<T: fmt::Display>(msg: T) -> Self {
        PostgrestError::InvalidParameters(msg.to_string())
    }

    /// Status code of the HTTP response, for API errors
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Structured server error details, when the error body carried them
    pub fn api_details(&self) -> Option<&PostgrestApiErrorDetails> {
        match self {
            PostgrestError::ApiError { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            PostgrestError::ApiError { .. } | PostgrestError::UnparsedApiError { .. }
        )
    }
}
