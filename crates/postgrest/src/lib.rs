//! Fluent PostgREST client for Rust
//!
//! This crate builds PostgREST requests from chained method calls and decodes
//! the responses, either into untyped [`Row`]s or into your own row types.
//!
//! # Features
//!
//! - Query API (`select`, `insert`, `upsert`, `update`, `delete`)
//! - Filtering (`eq`, `gt`, `in_list`, `or`, ...) with PostgREST escaping
//! - Ordering and pagination
//! - `Prefer` handling for return representation, counts and upserts
//! - RPC function calls
//! - CSV export
//!
//! ```no_run
//! use postgrest_fluent_core::{PostgrestClient, SortOrder};
//!
//! # async fn run() -> Result<(), postgrest_fluent_core::PostgrestError> {
//! let client = PostgrestClient::new("http://localhost:3000", "anon-key", reqwest::Client::new())?;
//! let response = client
//!     .from("todos")
//!     .select("id,title")
//!     .eq("done", false)
//!     .order("id", SortOrder::Ascending)
//!     .execute()
//!     .await?;
//! println!("{} open todos", response.data.len());
//! # Ok(())
//! # }
//! ```
//!
//! An operation can only be chosen once per builder:
//!
//! ```compile_fail
//! use postgrest_fluent_core::PostgrestClient;
//!
//! let client = PostgrestClient::new("http://localhost:3000", "anon-key", reqwest::Client::new()).unwrap();
//! let builder = client.from("todos").select("*").insert(serde_json::json!({"title": "x"}));
//! ```

pub mod context;
pub mod error;
pub mod filter;
pub mod query;
pub mod response;
pub mod transport;
pub mod types;

use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub use context::{RequestContext, DEFAULT_TIMEOUT};
pub use error::{PostgrestApiErrorDetails, PostgrestError};
pub use filter::{Condition, Filter, FilterOperator, FilterValue, LogicOperator, TextSearchKind};
pub use query::{
    FilterBuilder, Mutation, PendingQuery, QueryBuilder, RequestBuilder, Row, Select,
    SelectBuilder,
};
pub use response::{parse_content_range, ApiResponse};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    CountMethod, InsertOptions, MutationOptions, Order, Prefer, Resolution, ReturnMethod,
    SortOrder, Table, UpsertOptions,
};

/// PostgREST クライアント
///
/// Holds the endpoint configuration and the transport. Every call to
/// [`from`](Self::from) copies the configuration into a new builder, so
/// builders never share mutable state.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    context: RequestContext,
    transport: Arc<dyn HttpTransport>,
}

impl PostgrestClient {
    /// 新しい PostgREST クライアントを作成
    ///
    /// `base_url` is the PostgREST root (for Supabase, `https://<project>.supabase.co/rest/v1`).
    /// An empty `api_key` sends no `apikey` header.
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Result<Self, PostgrestError> {
        let mut context = RequestContext::new(base_url)?;
        if !api_key.is_empty() {
            context = context.with_api_key(api_key)?;
        }
        Ok(Self::with_transport(
            context,
            Arc::new(ReqwestTransport::new(http_client)),
        ))
    }

    /// Create a client over any transport
    pub fn with_transport(context: RequestContext, transport: Arc<dyn HttpTransport>) -> Self {
        Self { context, transport }
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        self.context = self.context.with_header(key, value)?;
        Ok(self)
    }

    /// 認証トークンを設定
    pub fn with_auth(mut self, token: &str) -> Result<Self, PostgrestError> {
        self.context = self.context.with_auth(token)?;
        Ok(self)
    }

    /// スキーマを指定（デフォルトのpublicスキーマではない場合）
    pub fn schema(mut self, schema_name: &str) -> Self {
        self.context = self.context.with_schema(schema_name);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.context = self.context.with_timeout(timeout);
        self
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Start an operation on a table or view
    pub fn from(&self, table: &str) -> RequestBuilder {
        RequestBuilder::new(self.context.clone(), self.transport.clone(), table)
    }

    /// Alias of [`from`](Self::from)
    pub fn table(&self, table: &str) -> RequestBuilder {
        self.from(table)
    }

    #[deprecated(since = "0.2.0", note = "use `from` instead")]
    pub fn from_table(&self, table: &str) -> RequestBuilder {
        self.from(table)
    }

    /// Start an operation whose rows decode as `M`, on `M`'s table
    pub fn from_model<M: Table>(&self) -> RequestBuilder<M> {
        self.from(M::table_name()).returns()
    }

    /// RPC関数を呼び出す (POSTリクエスト)
    ///
    /// The result set can be filtered, ordered and paginated like a select.
    /// Use [`returns`](FilterBuilder::returns) to decode a typed result.
    pub fn rpc<P: Serialize>(
        &self,
        function: &str,
        params: P,
    ) -> Result<SelectBuilder, PostgrestError> {
        let params = serde_json::to_value(params)?;
        Ok(FilterBuilder::from_query(QueryBuilder::rpc(
            self.context.clone(),
            self.transport.clone(),
            function,
            params,
        )))
    }
}
