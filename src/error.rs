//! Error handling for the PostgREST client

use std::fmt;
use thiserror::Error;

use postgrest_fluent_core::PostgrestError;

/// Unified error type for the client facade
#[derive(Error, Debug)]
pub enum Error {
    /// Request building, transport or server errors
    #[error(transparent)]
    Postgrest(#[from] PostgrestError),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
