//! PostgREST Rust Client Library
//!
//! A thin facade over [`postgrest_fluent_core`] that builds a configured
//! client from [`ClientOptions`] or from the environment.
//!
//! ```no_run
//! use postgrest_fluent::prelude::*;
//!
//! # async fn run() -> postgrest_fluent::error::Result<()> {
//! let client = Client::new("http://localhost:3000", "anon-key")?;
//! let todos = client
//!     .from("todos")
//!     .select("*")
//!     .order("id", SortOrder::Ascending)
//!     .limit(10)
//!     .execute()
//!     .await?;
//! println!("{:?}", todos.data);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;

pub use postgrest_fluent_core as postgrest;

use log::debug;
use serde::Serialize;
use std::env;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use postgrest_fluent_core::{PostgrestClient, RequestBuilder, SelectBuilder, Table};

/// Schema PostgREST serves when no profile header is sent
const DEFAULT_SCHEMA: &str = "public";

/// The main entry point for the PostgREST client
#[derive(Debug, Clone)]
pub struct Client {
    /// The PostgREST root URL
    pub url: String,
    /// Client options
    pub options: ClientOptions,
    postgrest: PostgrestClient,
}

impl Client {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `url` - The PostgREST root, e.g. `https://<project>.supabase.co/rest/v1`
    /// * `key` - API key sent as `apikey`; pass `""` for none
    pub fn new(url: &str, key: &str) -> Result<Self> {
        Self::new_with_options(url, key, ClientOptions::default())
    }

    /// Create a new client with custom options
    ///
    /// # Example
    ///
    /// ```
    /// use postgrest_fluent::{Client, config::ClientOptions};
    ///
    /// let options = ClientOptions::default().with_db_schema("api");
    /// let client = Client::new_with_options("http://localhost:3000", "anon-key", options).unwrap();
    /// assert_eq!(client.postgrest().context().schema(), Some("api"));
    /// ```
    pub fn new_with_options(url: &str, key: &str, options: ClientOptions) -> Result<Self> {
        let mut postgrest = PostgrestClient::new(url, key, reqwest::Client::new())?
            .timeout(options.request_timeout);

        if options.db_schema != DEFAULT_SCHEMA {
            postgrest = postgrest.schema(&options.db_schema);
        }
        for (name, value) in &options.headers {
            postgrest = postgrest.with_header(name, value)?;
        }

        debug!("postgrest client for {} (schema {})", url, options.db_schema);

        Ok(Self {
            url: url.to_string(),
            options,
            postgrest,
        })
    }

    /// Create a client from `POSTGREST_URL`, `POSTGREST_API_KEY` and `POSTGREST_SCHEMA`
    ///
    /// Only `POSTGREST_URL` is required.
    pub fn from_env() -> Result<Self> {
        let url = env::var("POSTGREST_URL")
            .map_err(|_| Error::config("POSTGREST_URL must be set"))?;
        let key = env::var("POSTGREST_API_KEY").unwrap_or_default();

        let mut options = ClientOptions::default();
        if let Ok(schema) = env::var("POSTGREST_SCHEMA") {
            if schema.trim().is_empty() {
                return Err(Error::config("POSTGREST_SCHEMA must not be empty"));
            }
            options = options.with_db_schema(schema.trim());
        }

        Self::new_with_options(&url, &key, options)
    }

    /// Authenticate every request made through the returned client
    pub fn with_auth(mut self, token: &str) -> Result<Self> {
        self.postgrest = self.postgrest.with_auth(token)?;
        Ok(self)
    }

    /// Start an operation on a table or view
    ///
    /// ```
    /// use postgrest_fluent::Client;
    ///
    /// let client = Client::new("http://localhost:3000", "anon-key").unwrap();
    /// let query = client.from("users").select("id,name");
    /// ```
    pub fn from(&self, table: &str) -> RequestBuilder {
        self.postgrest.from(table)
    }

    pub fn table(&self, table: &str) -> RequestBuilder {
        self.postgrest.table(table)
    }

    pub fn from_model<M: Table>(&self) -> RequestBuilder<M> {
        self.postgrest.from_model::<M>()
    }

    /// Call a database function
    pub fn rpc<P: Serialize>(&self, function: &str, params: P) -> Result<SelectBuilder> {
        Ok(self.postgrest.rpc(function, params)?)
    }

    /// The underlying PostgREST client
    pub fn postgrest(&self) -> &PostgrestClient {
        &self.postgrest
    }
}

/// Common imports
pub mod prelude {
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::Client;
    pub use postgrest_fluent_core::{
        ApiResponse, Condition, CountMethod, Filter, InsertOptions, MutationOptions, Order,
        PostgrestError, ReturnMethod, Row, SortOrder, Table, TextSearchKind, UpsertOptions,
    };
}
