//! Request builders for table operations
//!
//! A [`RequestBuilder`] is bound to one table. Choosing an operation consumes
//! it and returns a builder that only offers what is valid afterwards:
//!
//! * `select` → [`SelectBuilder`]: filters, ordering, pagination
//! * `update`/`delete` → [`FilterBuilder`]: filters
//! * `insert`/`upsert` → [`QueryBuilder`]: execute only

use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, Method};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::PostgrestError;
use crate::filter::{to_strings, Condition, Filter, FilterOperator, FilterValue, TextSearchKind};
use crate::response::{api_error, classify, ApiResponse};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{
    CountMethod, InsertOptions, MutationOptions, Order, Prefer, SortOrder, UpsertOptions,
};

/// Untyped row: a JSON object with arbitrary columns
pub type Row = Map<String, Value>;

/// Builder after `select` (or `rpc`): filters, ordering and pagination
pub type SelectBuilder<T = Row> = FilterBuilder<T, Select>;

/// Marker for builders whose result set can be ordered and paginated
#[derive(Debug)]
pub enum Select {}

/// Marker for `update`/`delete` builders
#[derive(Debug)]
pub enum Mutation {}

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Method, path, query parameters, headers and body of one request
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    method: Method,
    /// Unencoded path segments below the base URL
    segments: Vec<String>,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Value>,
}

impl PendingQuery {
    pub(crate) fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            params: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Unencoded path, e.g. `/rpc/my_function`
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Query parameters in insertion order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First value of a query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    fn append_param(&mut self, key: String, value: String) {
        self.params.push((key, value));
    }

    fn set_param(&mut self, key: &str, value: String) {
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key.to_string(), value)),
        }
    }

    /// Appends `value` to a comma separated parameter such as `order`
    fn join_param(&mut self, key: &str, value: String) {
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => {
                entry.1.push(',');
                entry.1.push_str(&value);
            }
            None => self.params.push((key.to_string(), value)),
        }
    }

    /// Directives are plain ASCII, so the header value is always valid
    fn set_prefer(&mut self, prefer: &Prefer) {
        if let Some(value) = prefer.header_value().and_then(|v| HeaderValue::from_str(&v).ok()) {
            self.headers.insert(HeaderName::from_static("prefer"), value);
        }
    }

    /// Assembles the outbound request on top of the context defaults
    pub fn to_http_request(&self, context: &RequestContext) -> Result<HttpRequest, PostgrestError> {
        let mut url = context.url_for(&self.segments)?;
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }

        let mut headers = context.headers().clone();
        if let Some(schema) = context.schema() {
            let profile = if self.method == Method::GET || self.method == Method::HEAD {
                "accept-profile"
            } else {
                "content-profile"
            };
            let value = HeaderValue::from_str(schema)
                .map_err(|_| PostgrestError::invalid(format!("Invalid schema name: {}", schema)))?;
            headers.insert(HeaderName::from_static(profile), value);
        }

        let body = match &self.body {
            Some(body) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(serde_json::to_vec(body)?)
            }
            None => None,
        };

        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(HttpRequest {
            method: self.method.clone(),
            url: url.to_string(),
            headers,
            body,
            timeout: context.timeout(),
        })
    }
}

/// Entry point for one operation on a table
pub struct RequestBuilder<T = Row> {
    context: RequestContext,
    transport: Arc<dyn HttpTransport>,
    table: String,
    _row: PhantomData<fn() -> T>,
}

impl<T> RequestBuilder<T> {
    pub(crate) fn new(context: RequestContext, transport: Arc<dyn HttpTransport>, table: &str) -> Self {
        Self {
            context,
            transport,
            table: table.to_string(),
            _row: PhantomData,
        }
    }

    /// Unencoded path of the target table, e.g. `/todos`
    pub fn path(&self) -> String {
        format!("/{}", self.table)
    }

    /// Adds a header to this operation only
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        self.context = self.context.with_header(key, value)?;
        Ok(self)
    }

    /// Authenticates this operation only
    pub fn with_auth(mut self, token: &str) -> Result<Self, PostgrestError> {
        self.context = self.context.with_auth(token)?;
        Ok(self)
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.context = self.context.with_schema(schema);
        self
    }

    /// Decode rows as `U` instead of `T`
    pub fn returns<U>(self) -> RequestBuilder<U> {
        RequestBuilder::new(self.context, self.transport, &self.table)
    }

    fn finish(self, query: PendingQuery, count: Option<CountMethod>) -> QueryBuilder<T> {
        QueryBuilder {
            context: self.context,
            transport: self.transport,
            query,
            count,
            _row: PhantomData,
        }
    }

    /// 取得するカラムを指定
    ///
    /// Whitespace outside double quotes is dropped; an empty list selects `*`.
    /// Embedded resources are written inline, e.g. `id,comments(id,text)`.
    pub fn select(self, columns: &str) -> SelectBuilder<T> {
        self.select_query(columns, None)
    }

    /// Select and ask the server for the total row count
    pub fn select_with_count(self, columns: &str, count: CountMethod) -> SelectBuilder<T> {
        self.select_query(columns, Some(count))
    }

    fn select_query(self, columns: &str, count: Option<CountMethod>) -> SelectBuilder<T> {
        let mut query = PendingQuery::new(Method::GET, &[self.table.as_str()]);
        query.set_param("select", clean_columns(columns));
        query.set_prefer(&Prefer {
            count,
            ..Prefer::default()
        });
        FilterBuilder::from_query(self.finish(query, count))
    }

    /// データを挿入
    pub fn insert<V: Serialize>(self, values: V) -> Result<QueryBuilder<T>, PostgrestError> {
        self.insert_with(values, InsertOptions::default())
    }

    pub fn insert_with<V: Serialize>(
        self,
        values: V,
        options: InsertOptions,
    ) -> Result<QueryBuilder<T>, PostgrestError> {
        let mut query = PendingQuery::new(Method::POST, &[self.table.as_str()]);
        query.body = Some(serde_json::to_value(values)?);
        query.set_prefer(&options.prefer());
        Ok(self.finish(query, options.count))
    }

    /// Insert, merging rows that collide with an existing key
    pub fn upsert<V: Serialize>(self, values: V) -> Result<QueryBuilder<T>, PostgrestError> {
        self.upsert_with(values, UpsertOptions::default())
    }

    pub fn upsert_with<V: Serialize>(
        self,
        values: V,
        options: UpsertOptions,
    ) -> Result<QueryBuilder<T>, PostgrestError> {
        let mut query = PendingQuery::new(Method::POST, &[self.table.as_str()]);
        query.body = Some(serde_json::to_value(values)?);
        query.set_prefer(&options.prefer());
        if let Some(columns) = &options.on_conflict {
            query.set_param("on_conflict", clean_columns(columns));
        }
        Ok(self.finish(query, options.count))
    }

    /// データを更新
    pub fn update<V: Serialize>(self, values: V) -> Result<FilterBuilder<T>, PostgrestError> {
        self.update_with(values, MutationOptions::default())
    }

    pub fn update_with<V: Serialize>(
        self,
        values: V,
        options: MutationOptions,
    ) -> Result<FilterBuilder<T>, PostgrestError> {
        let mut query = PendingQuery::new(Method::PATCH, &[self.table.as_str()]);
        query.body = Some(serde_json::to_value(values)?);
        query.set_prefer(&options.prefer());
        Ok(FilterBuilder::from_query(self.finish(query, options.count)))
    }

    /// データを削除
    pub fn delete(self) -> FilterBuilder<T> {
        self.delete_with(MutationOptions::default())
    }

    pub fn delete_with(self, options: MutationOptions) -> FilterBuilder<T> {
        let mut query = PendingQuery::new(Method::DELETE, &[self.table.as_str()]);
        query.set_prefer(&options.prefer());
        FilterBuilder::from_query(self.finish(query, options.count))
    }
}

/// Strips whitespace outside double quotes from a column list
fn clean_columns(columns: &str) -> String {
    let mut quoted = false;
    let cleaned: String = columns
        .chars()
        .filter(|c| {
            if *c == '"' {
                quoted = !quoted;
            }
            quoted || !c.is_whitespace()
        })
        .collect();

    if cleaned.is_empty() {
        "*".to_string()
    } else {
        cleaned
    }
}

/// A built query, ready to execute.
///
/// `execute` borrows the builder: the pending query cannot change once sent,
/// and calling `execute` again sends a fresh, identical request.
pub struct QueryBuilder<T = Row> {
    context: RequestContext,
    transport: Arc<dyn HttpTransport>,
    query: PendingQuery,
    count: Option<CountMethod>,
    _row: PhantomData<fn() -> T>,
}

impl<T> QueryBuilder<T> {
    pub(crate) fn rpc(
        context: RequestContext,
        transport: Arc<dyn HttpTransport>,
        function: &str,
        params: Value,
    ) -> Self {
        let mut query = PendingQuery::new(Method::POST, &["rpc", function]);
        query.body = Some(params);
        Self {
            context,
            transport,
            query,
            count: None,
            _row: PhantomData,
        }
    }

    pub fn query(&self) -> &PendingQuery {
        &self.query
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Decode rows as `U` instead of `T`
    pub fn returns<U>(self) -> QueryBuilder<U> {
        QueryBuilder {
            context: self.context,
            transport: self.transport,
            query: self.query,
            count: self.count,
            _row: PhantomData,
        }
    }

    /// The request `execute` would send
    pub fn build_request(&self) -> Result<HttpRequest, PostgrestError> {
        self.query.to_http_request(&self.context)
    }

    /// Send the request and return the response without interpreting it
    pub async fn execute_raw(&self) -> Result<HttpResponse, PostgrestError> {
        let request = self.build_request()?;
        debug!("{} {}", request.method, request.url);
        self.transport.send(request).await
    }
}

impl<T: DeserializeOwned> QueryBuilder<T> {
    /// Send the request and decode the response into rows of `T`
    pub async fn execute(&self) -> Result<ApiResponse<T>, PostgrestError> {
        let response = self.execute_raw().await?;
        classify(&response, self.count.is_some())
    }
}

/// A built query that still accepts filters
pub struct FilterBuilder<T = Row, K = Mutation> {
    inner: QueryBuilder<T>,
    _kind: PhantomData<K>,
}

impl<T, K> FilterBuilder<T, K> {
    pub(crate) fn from_query(inner: QueryBuilder<T>) -> Self {
        Self {
            inner,
            _kind: PhantomData,
        }
    }

    fn push(mut self, key: String, value: String) -> Self {
        self.inner.query.append_param(key, value);
        self
    }

    fn push_filter(self, filter: Filter) -> Self {
        let (column, value) = filter.to_param();
        self.push(column, value)
    }

    pub fn query(&self) -> &PendingQuery {
        self.inner.query()
    }

    pub fn context(&self) -> &RequestContext {
        self.inner.context()
    }

    /// Decode rows as `U` instead of `T`
    pub fn returns<U>(self) -> FilterBuilder<U, K> {
        FilterBuilder::from_query(self.inner.returns())
    }

    /// Raw filter: `column=operator.criteria`, sent verbatim
    pub fn filter(self, column: &str, operator: &str, criteria: &str) -> Self {
        self.push(column.to_string(), format!("{}.{}", operator, criteria))
    }

    /// 等価フィルター
    pub fn eq<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::eq(column, value))
    }

    pub fn neq<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::neq(column, value))
    }

    /// より大きいフィルター
    pub fn gt<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::gt(column, value))
    }

    /// 以上フィルター
    pub fn gte<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::gte(column, value))
    }

    /// より小さいフィルター
    pub fn lt<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::lt(column, value))
    }

    /// 以下フィルター
    pub fn lte<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::lte(column, value))
    }

    /// LIKE フィルター
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.push_filter(Filter::like(column, pattern))
    }

    /// ILIKE フィルター（大文字小文字を区別しない）
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.push_filter(Filter::ilike(column, pattern))
    }

    /// `IS` check against `null`, `true`, `false` or `unknown`
    pub fn is<V: ToString>(self, column: &str, value: V) -> Self {
        self.push_filter(Filter::is(column, value))
    }

    /// IN フィルター
    pub fn in_list<V: ToString>(self, column: &str, values: &[V]) -> Result<Self, PostgrestError> {
        Ok(self.push_filter(Filter::in_list(column, values)?))
    }

    /// Array column contains every element (`cs`)
    pub fn contains<V: ToString>(self, column: &str, values: &[V]) -> Result<Self, PostgrestError> {
        self.list_filter(column, FilterOperator::Contains, values)
    }

    /// Array column is contained by the elements (`cd`)
    pub fn contained_by<V: ToString>(
        self,
        column: &str,
        values: &[V],
    ) -> Result<Self, PostgrestError> {
        self.list_filter(column, FilterOperator::ContainedBy, values)
    }

    /// Array column shares an element with the list (`ov`)
    pub fn overlaps<V: ToString>(self, column: &str, values: &[V]) -> Result<Self, PostgrestError> {
        self.list_filter(column, FilterOperator::Overlap, values)
    }

    fn list_filter<V: ToString>(
        self,
        column: &str,
        operator: FilterOperator,
        values: &[V],
    ) -> Result<Self, PostgrestError> {
        let filter = Filter::new(column, operator, FilterValue::List(to_strings(values)))?;
        Ok(self.push_filter(filter))
    }

    /// JSON/JSONB カラムが指定した値を含むか (`cs`, `@>`) フィルター
    pub fn contains_json(self, column: &str, value: &Value) -> Result<Self, PostgrestError> {
        Ok(self.push_filter(Filter::new(column, FilterOperator::Contains, value.clone())?))
    }

    /// JSON/JSONB カラムが指定した値に含まれるか (`cd`, `<@`) フィルター
    pub fn contained_by_json(self, column: &str, value: &Value) -> Result<Self, PostgrestError> {
        Ok(self.push_filter(Filter::new(column, FilterOperator::ContainedBy, value.clone())?))
    }

    /// Range is strictly greater than `range` (`sr`)
    pub fn range_gt(self, column: &str, range: &str) -> Self {
        self.operator_filter(column, FilterOperator::StrictlyRight, range)
    }

    /// Range does not extend to the left of `range` (`nxl`)
    pub fn range_gte(self, column: &str, range: &str) -> Self {
        self.operator_filter(column, FilterOperator::NotExtendLeft, range)
    }

    /// Range is strictly less than `range` (`sl`)
    pub fn range_lt(self, column: &str, range: &str) -> Self {
        self.operator_filter(column, FilterOperator::StrictlyLeft, range)
    }

    /// Range does not extend to the right of `range` (`nxr`)
    pub fn range_lte(self, column: &str, range: &str) -> Self {
        self.operator_filter(column, FilterOperator::NotExtendRight, range)
    }

    pub fn range_adjacent(self, column: &str, range: &str) -> Self {
        self.operator_filter(column, FilterOperator::Adjacent, range)
    }

    fn operator_filter(self, column: &str, operator: FilterOperator, criteria: &str) -> Self {
        self.push(column.to_string(), format!("{}.{}", operator, criteria))
    }

    /// 全文検索
    pub fn text_search(
        self,
        column: &str,
        query: &str,
        kind: TextSearchKind,
        config: Option<&str>,
    ) -> Self {
        self.operator_filter(column, kind.operator(config), query)
    }

    /// NOT フィルター: `column=not.operator.criteria`
    pub fn not(self, column: &str, operator: &str, criteria: &str) -> Self {
        self.push(column.to_string(), format!("not.{}.{}", operator, criteria))
    }

    /// Equality filter for every `(column, value)` pair
    pub fn matches<V: ToString>(self, pairs: &[(&str, V)]) -> Self {
        pairs
            .iter()
            .fold(self, |builder, (column, value)| builder.eq(column, value.to_string()))
    }

    /// Adds a filter or logic group as one query parameter
    pub fn condition(self, condition: Condition) -> Result<Self, PostgrestError> {
        let (key, value) = condition.to_param()?;
        Ok(self.push(key, value))
    }

    /// `or=(...)`: at least one of the conditions holds
    pub fn or(self, conditions: Vec<Condition>) -> Result<Self, PostgrestError> {
        self.condition(Condition::or(conditions))
    }

    /// `and=(...)`: all conditions hold, useful nested or negated
    pub fn and(self, conditions: Vec<Condition>) -> Result<Self, PostgrestError> {
        self.condition(Condition::and(conditions))
    }

    pub fn build_request(&self) -> Result<HttpRequest, PostgrestError> {
        self.inner.build_request()
    }

    pub async fn execute_raw(&self) -> Result<HttpResponse, PostgrestError> {
        self.inner.execute_raw().await
    }
}

impl<T: DeserializeOwned, K> FilterBuilder<T, K> {
    /// データを取得
    pub async fn execute(&self) -> Result<ApiResponse<T>, PostgrestError> {
        self.inner.execute().await
    }
}

impl<T> FilterBuilder<T, Select> {
    /// ソート順を指定
    ///
    /// Repeated calls add tie-breakers: `order=a.asc,b.desc`.
    pub fn order(self, column: &str, order: SortOrder) -> Self {
        self.order_by(Order::new(column, order))
    }

    pub fn order_by(mut self, order: Order) -> Self {
        let key = referenced_key(order.referenced_table.as_deref(), "order");
        self.inner.query.join_param(&key, order.encode());
        self
    }

    /// 取得件数を制限
    pub fn limit(self, count: u64) -> Self {
        self.set(None, "limit", count)
    }

    /// Limit the rows of an embedded resource
    pub fn limit_on(self, referenced_table: &str, count: u64) -> Self {
        self.set(Some(referenced_table), "limit", count)
    }

    /// オフセットを指定
    pub fn offset(self, count: u64) -> Self {
        self.set(None, "offset", count)
    }

    /// Rows `from..=to` (zero based, inclusive)
    pub fn range(self, from: u64, to: u64) -> Result<Self, PostgrestError> {
        if to < from {
            return Err(PostgrestError::invalid(format!(
                "Invalid range {}-{}: end before start",
                from, to
            )));
        }
        let count = (to - from).checked_add(1).ok_or_else(|| {
            PostgrestError::invalid(format!("Invalid range {}-{}: too many rows", from, to))
        })?;
        Ok(self.offset(from).limit(count))
    }

    fn set(mut self, referenced_table: Option<&str>, key: &str, value: u64) -> Self {
        let key = referenced_key(referenced_table, key);
        self.inner.query.set_param(&key, value.to_string());
        self
    }

    /// Ask for exactly one row as a JSON object; PostgREST answers 406 otherwise
    pub fn single(mut self) -> Self {
        self.inner
            .query
            .headers
            .insert(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT));
        self
    }

    /// CSVとしてデータをエクスポート
    pub async fn export_csv(&self) -> Result<String, PostgrestError> {
        let mut request = self.build_request()?;
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("text/csv"));
        debug!("{} {} (csv)", request.method, request.url);

        let response = self.inner.transport.send(request).await?;
        if response.status.as_u16() >= 400 {
            return Err(api_error(&response));
        }
        Ok(response.body)
    }
}

fn referenced_key(referenced_table: Option<&str>, key: &str) -> String {
    match referenced_table {
        Some(table) => format!("{}.{}", table, key),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::recording::RecordingTransport;
    use crate::types::ReturnMethod;
    use serde::Deserialize;
    use serde_json::json;
    use url::Url;

    fn builder(transport: &Arc<RecordingTransport>, table: &str) -> RequestBuilder {
        let context = RequestContext::new("http://localhost:3000")
            .unwrap()
            .with_api_key("anon")
            .unwrap();
        RequestBuilder::new(context, transport.clone(), table)
    }

    fn query_pairs(request: &HttpRequest) -> Vec<(String, String)> {
        Url::parse(&request.url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_select_eq_order() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));
        builder(&transport, "t")
            .select("a, b")
            .eq("x", 1)
            .order("a", SortOrder::Ascending)
            .execute()
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(Url::parse(&request.url).unwrap().path(), "/t");
        assert_eq!(
            query_pairs(request),
            pairs(&[("select", "a,b"), ("x", "eq.1"), ("order", "a.asc")])
        );
        assert!(request.body.is_none());
        assert!(request.headers.get("prefer").is_none());
        assert_eq!(request.headers.get("apikey").unwrap(), "anon");
    }

    #[test]
    fn test_select_columns_cleanup() {
        assert_eq!(clean_columns(" id, name ,\"full name\" "), "id,name,\"full name\"");
        assert_eq!(clean_columns(""), "*");
        assert_eq!(clean_columns("*, comments ( id, text )"), "*,comments(id,text)");
    }

    #[tokio::test]
    async fn test_insert_upsert_minimal() {
        let transport = Arc::new(RecordingTransport::new(201, ""));
        let options = InsertOptions::default()
            .with_upsert(true)
            .with_returning(ReturnMethod::Minimal);
        let response = builder(&transport, "t")
            .insert_with(json!({"id": 1, "name": "a"}), options)
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.count, None);

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers.get("prefer").unwrap(),
            "return=minimal,resolution=merge-duplicates"
        );
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn test_operation_methods_and_headers() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));

        let upsert = builder(&transport, "t")
            .upsert_with(
                json!([{"id": 1}]),
                UpsertOptions::default()
                    .with_ignore_duplicates(true)
                    .with_on_conflict("id, org"),
            )
            .unwrap();
        assert_eq!(upsert.query().method(), &Method::POST);
        assert_eq!(upsert.query().param("on_conflict"), Some("id,org"));
        assert_eq!(
            upsert.query().headers().get("prefer").unwrap(),
            "return=representation,resolution=ignore-duplicates"
        );

        let update = builder(&transport, "t")
            .update_with(
                json!({"done": true}),
                MutationOptions::default().with_count(CountMethod::Exact),
            )
            .unwrap()
            .eq("id", 3);
        assert_eq!(update.query().method(), &Method::PATCH);
        assert_eq!(
            update.query().headers().get("prefer").unwrap(),
            "return=representation,count=exact"
        );
        assert_eq!(update.query().param("id"), Some("eq.3"));

        let delete = builder(&transport, "t").delete().lt("age", 5);
        assert_eq!(delete.query().method(), &Method::DELETE);
        assert!(delete.query().body().is_none());

        let select = builder(&transport, "t").select_with_count("*", CountMethod::Planned);
        assert_eq!(
            select.query().headers().get("prefer").unwrap(),
            "count=planned"
        );
    }

    #[test]
    fn test_schema_profile_headers() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));

        let read = builder(&transport, "t").with_schema("api").select("*");
        let request = read.build_request().unwrap();
        assert_eq!(request.headers.get("accept-profile").unwrap(), "api");
        assert!(request.headers.get("content-profile").is_none());

        let write = builder(&transport, "t")
            .with_schema("api")
            .insert(json!({}))
            .unwrap();
        let request = write.build_request().unwrap();
        assert_eq!(request.headers.get("content-profile").unwrap(), "api");
    }

    #[test]
    fn test_filters_accumulate() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));
        let query = builder(&transport, "people")
            .select("*")
            .gte("age", 18)
            .lte("age", 65)
            .ilike("name", "%ann%")
            .is("deleted_at", "null")
            .in_list("role", &["admin", "dev ops"])
            .unwrap()
            .contains("tags", &["a", "b"])
            .unwrap()
            .contains_json("meta", &json!({"vip": true}))
            .unwrap()
            .overlaps("langs", &["en", "fr"])
            .unwrap()
            .range_gt("during", "[2000-01-01,2000-12-31)")
            .text_search("bio", "rust & async", TextSearchKind::Plain, Some("english"))
            .not("status", "eq", "banned")
            .matches(&[("country", "NO"), ("city", "Oslo")])
            .or(vec![Filter::eq("team", "a").into(), Filter::eq("team", "b").into()])
            .unwrap();

        let request = query.build_request().unwrap();
        assert_eq!(
            query_pairs(&request),
            pairs(&[
                ("select", "*"),
                ("age", "gte.18"),
                ("age", "lte.65"),
                ("name", "ilike.*ann*"),
                ("deleted_at", "is.null"),
                ("role", "in.(admin,\"dev ops\")"),
                ("tags", "cs.{a,b}"),
                ("meta", "cs.{\"vip\":true}"),
                ("langs", "ov.{en,fr}"),
                ("during", "sr.[2000-01-01,2000-12-31)"),
                ("bio", "plfts(english).rust & async"),
                ("status", "not.eq.banned"),
                ("country", "eq.NO"),
                ("city", "eq.Oslo"),
                ("or", "(team.eq.a,team.eq.b)"),
            ])
        );
    }

    #[test]
    fn test_invalid_filters_fail_before_sending() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));
        let empty: [i32; 0] = [];

        let err = builder(&transport, "t")
            .select("*")
            .in_list("id", &empty)
            .err()
            .unwrap();
        assert!(matches!(err, PostgrestError::InvalidParameters(_)));
        assert!(builder(&transport, "t").delete().or(vec![]).is_err());
        assert!(builder(&transport, "t").select("*").range(5, 2).is_err());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_order_limit_range_single() {
        let transport = Arc::new(RecordingTransport::new(200, "{}"));
        let query = builder(&transport, "posts")
            .select("id,comments(id)")
            .order("created_at", SortOrder::Descending)
            .order_by(Order::asc("id").nulls_last())
            .order_by(Order::desc("id").on("comments"))
            .limit_on("comments", 3)
            .range(10, 19)
            .unwrap()
            .single();

        assert_eq!(query.query().param("order"), Some("created_at.desc,id.asc.nullslast"));
        assert_eq!(query.query().param("comments.order"), Some("id.desc"));
        assert_eq!(query.query().param("comments.limit"), Some("3"));
        assert_eq!(query.query().param("offset"), Some("10"));
        assert_eq!(query.query().param("limit"), Some("10"));

        let request = query.build_request().unwrap();
        assert_eq!(request.headers.get(ACCEPT).unwrap(), SINGLE_OBJECT);
    }

    #[test]
    fn test_names_are_escaped_in_path() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));
        let request = builder(&transport, "a?b")
            .select("*")
            .eq("id", 1)
            .build_request()
            .unwrap();
        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.path(), "/a%3Fb");
        assert_eq!(url.query(), Some("select=*&id=eq.1"));

        let context = RequestContext::new("http://localhost:3000").unwrap();
        let rpc: QueryBuilder = QueryBuilder::rpc(context, transport.clone(), "f#x", json!({}));
        assert_eq!(rpc.query().path(), "/rpc/f#x");
        let url = Url::parse(&rpc.build_request().unwrap().url).unwrap();
        assert_eq!(url.path(), "/rpc/f%23x");
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_range_bounds() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));

        let all = builder(&transport, "t").select("*").range(0, u64::MAX - 1).unwrap();
        assert_eq!(all.query().param("limit"), Some(u64::MAX.to_string().as_str()));

        assert!(matches!(
            builder(&transport, "t").select("*").range(0, u64::MAX),
            Err(PostgrestError::InvalidParameters(_))
        ));
        assert!(matches!(
            builder(&transport, "t").select("*").range(5, 4),
            Err(PostgrestError::InvalidParameters(_))
        ));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_single_decodes_one_object() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Post {
            id: i64,
            title: String,
        }

        let transport = Arc::new(RecordingTransport::new(200, r#"{"id":4,"title":"hello"}"#));
        let response = builder(&transport, "posts")
            .returns::<Post>()
            .select("id,title")
            .eq("id", 4)
            .single()
            .execute()
            .await
            .unwrap();

        assert_eq!(
            response.data,
            vec![Post {
                id: 4,
                title: "hello".to_string()
            }]
        );
        assert_eq!(
            transport.requests()[0].headers.get(ACCEPT).unwrap(),
            SINGLE_OBJECT
        );
    }

    #[tokio::test]
    async fn test_single_without_exactly_one_row_is_api_error() {
        let transport = Arc::new(RecordingTransport::new(
            406,
            r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned","details":"The result contains 0 rows","hint":null}"#,
        ));
        let err = builder(&transport, "posts")
            .select("*")
            .eq("id", 999)
            .single()
            .execute()
            .await
            .unwrap_err();

        match err {
            PostgrestError::ApiError { details, status } => {
                assert_eq!(status, http::StatusCode::NOT_ACCEPTABLE);
                assert_eq!(details.code.as_deref(), Some("PGRST116"));
                assert_eq!(details.details.as_deref(), Some("The result contains 0 rows"));
            }
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_twice_sends_identical_requests() {
        let transport = Arc::new(
            RecordingTransport::new(200, r#"[{"id":1}]"#).with_header("content-range", "0-0/1"),
        );
        let query = builder(&transport, "t")
            .select_with_count("id", CountMethod::Exact)
            .eq("id", 1);

        let first = query.execute().await.unwrap();
        let second = query.execute().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.count, Some(1));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, requests[1].url);
        assert_eq!(requests[0].headers, requests[1].headers);
    }

    #[tokio::test]
    async fn test_typed_and_untyped_paths_send_the_same_request() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Todo {
            id: i64,
        }

        let transport = Arc::new(RecordingTransport::new(200, r#"[{"id":7}]"#));
        let untyped = builder(&transport, "todos").select("id").eq("id", 7);
        let typed = builder(&transport, "todos")
            .returns::<Todo>()
            .select("id")
            .eq("id", 7);

        let rows = untyped.execute().await.unwrap();
        let todos = typed.execute().await.unwrap();
        assert_eq!(rows.data[0].get("id"), Some(&json!(7)));
        assert_eq!(todos.data, vec![Todo { id: 7 }]);

        let requests = transport.requests();
        assert_eq!(requests[0].url, requests[1].url);
        assert_eq!(requests[0].method, requests[1].method);
    }

    #[tokio::test]
    async fn test_per_operation_header_override() {
        let transport = Arc::new(RecordingTransport::new(200, "[]"));
        let base = builder(&transport, "t");
        let context_before = base.context.headers().clone();

        let authed = base.with_auth("user-jwt").unwrap().select("*");
        authed.execute().await.unwrap();
        builder(&transport, "t").select("*").execute().await.unwrap();

        let requests = transport.requests();
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            "Bearer user-jwt"
        );
        assert!(requests[1].headers.get("authorization").is_none());
        assert!(context_before.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_export_csv() {
        let transport = Arc::new(RecordingTransport::new(200, "id,name\n1,a"));
        let csv = builder(&transport, "t").select("id,name").export_csv().await.unwrap();
        assert_eq!(csv, "id,name\n1,a");
        assert_eq!(transport.requests()[0].headers.get(ACCEPT).unwrap(), "text/csv");
    }
}
