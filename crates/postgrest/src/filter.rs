//! Filter grammar for PostgREST query strings
//!
//! A [`Filter`] is encoded as `column=operator.value`, a [`Condition`] group as
//! `or=(a.eq.1,b.gt.2)`. Elements of lists and groups that contain characters
//! PostgREST reserves for its own syntax are double-quoted.

use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::PostgrestError;

/// Characters that end a list element or a group member unless quoted
const RESERVED: &[char] = &[',', '.', ':', '(', ')', '"', '\\'];

/// Operator for filter expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Neq,

    /// Greater than
    Gt,

    /// Greater than or equal to
    Gte,

    /// Less than
    Lt,

    /// Less than or equal to
    Lte,

    /// Like (case sensitive)
    Like,

    /// Like (case insensitive)
    ILike,

    /// POSIX regular expression (case sensitive)
    Match,

    /// POSIX regular expression (case insensitive)
    IMatch,

    /// Is (`null`, `true`, `false`, `unknown`)
    Is,

    /// Is distinct from
    IsDistinct,

    /// In a list of values
    In,

    /// Contains (`@>`)
    Contains,

    /// Contained by (`<@`)
    ContainedBy,

    /// Overlap (`&&`)
    Overlap,

    /// Range is strictly left of (`<<`)
    StrictlyLeft,

    /// Range is strictly right of (`>>`)
    StrictlyRight,

    /// Range does not extend to the right of (`&<`)
    NotExtendRight,

    /// Range does not extend to the left of (`&>`)
    NotExtendLeft,

    /// Ranges are adjacent (`-|-`)
    Adjacent,

    /// Full-text search with `to_tsquery`, optionally with a text search config
    Fts(Option<String>),

    /// Full-text search with `plainto_tsquery`
    Plfts(Option<String>),

    /// Full-text search with `phraseto_tsquery`
    Phfts(Option<String>),

    /// Full-text search with `websearch_to_tsquery`
    Wfts(Option<String>),
}

impl FilterOperator {
    /// The operator keyword without any text search configuration
    pub fn keyword(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::Match => "match",
            FilterOperator::IMatch => "imatch",
            FilterOperator::Is => "is",
            FilterOperator::IsDistinct => "isdistinct",
            FilterOperator::In => "in",
            FilterOperator::Contains => "cs",
            FilterOperator::ContainedBy => "cd",
            FilterOperator::Overlap => "ov",
            FilterOperator::StrictlyLeft => "sl",
            FilterOperator::StrictlyRight => "sr",
            FilterOperator::NotExtendRight => "nxr",
            FilterOperator::NotExtendLeft => "nxl",
            FilterOperator::Adjacent => "adj",
            FilterOperator::Fts(_) => "fts",
            FilterOperator::Plfts(_) => "plfts",
            FilterOperator::Phfts(_) => "phfts",
            FilterOperator::Wfts(_) => "wfts",
        }
    }

    fn accepts_list(&self) -> bool {
        matches!(
            self,
            FilterOperator::In
                | FilterOperator::Contains
                | FilterOperator::ContainedBy
                | FilterOperator::Overlap
        )
    }

    fn accepts_json(&self) -> bool {
        matches!(self, FilterOperator::Contains | FilterOperator::ContainedBy)
    }

    fn text_search_config(&self) -> Option<&str> {
        match self {
            FilterOperator::Fts(config)
            | FilterOperator::Plfts(config)
            | FilterOperator::Phfts(config)
            | FilterOperator::Wfts(config) => config.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text_search_config() {
            Some(config) => write!(f, "{}({})", self.keyword(), config),
            None => f.write_str(self.keyword()),
        }
    }
}

impl FromStr for FilterOperator {
    type Err = PostgrestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (keyword, config) = match s.find('(') {
            Some(open) if s.ends_with(')') => {
                (&s[..open], Some(s[open + 1..s.len() - 1].to_string()))
            }
            Some(_) => {
                return Err(PostgrestError::invalid(format!(
                    "Malformed operator: {}",
                    s
                )))
            }
            None => (s, None),
        };

        let operator = match keyword {
            "fts" => return Ok(FilterOperator::Fts(config)),
            "plfts" => return Ok(FilterOperator::Plfts(config)),
            "phfts" => return Ok(FilterOperator::Phfts(config)),
            "wfts" => return Ok(FilterOperator::Wfts(config)),
            "eq" => FilterOperator::Eq,
            "neq" => FilterOperator::Neq,
            "gt" => FilterOperator::Gt,
            "gte" => FilterOperator::Gte,
            "lt" => FilterOperator::Lt,
            "lte" => FilterOperator::Lte,
            "like" => FilterOperator::Like,
            "ilike" => FilterOperator::ILike,
            "match" => FilterOperator::Match,
            "imatch" => FilterOperator::IMatch,
            "is" => FilterOperator::Is,
            "isdistinct" => FilterOperator::IsDistinct,
            "in" => FilterOperator::In,
            "cs" => FilterOperator::Contains,
            "cd" => FilterOperator::ContainedBy,
            "ov" => FilterOperator::Overlap,
            "sl" => FilterOperator::StrictlyLeft,
            "sr" => FilterOperator::StrictlyRight,
            "nxr" => FilterOperator::NotExtendRight,
            "nxl" => FilterOperator::NotExtendLeft,
            "adj" => FilterOperator::Adjacent,
            other => {
                return Err(PostgrestError::invalid(format!(
                    "Unknown filter operator: {}",
                    other
                )))
            }
        };

        if config.is_some() {
            return Err(PostgrestError::invalid(format!(
                "Operator {} does not take a configuration",
                keyword
            )));
        }
        Ok(operator)
    }
}

/// Flavour of full-text search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSearchKind {
    /// `to_tsquery`
    #[default]
    Default,
    /// `plainto_tsquery`
    Plain,
    /// `phraseto_tsquery`
    Phrase,
    /// `websearch_to_tsquery`
    Websearch,
}

impl TextSearchKind {
    pub fn operator(self, config: Option<&str>) -> FilterOperator {
        let config = config.map(str::to_string);
        match self {
            TextSearchKind::Default => FilterOperator::Fts(config),
            TextSearchKind::Plain => FilterOperator::Plfts(config),
            TextSearchKind::Phrase => FilterOperator::Phfts(config),
            TextSearchKind::Websearch => FilterOperator::Wfts(config),
        }
    }
}

/// Right-hand side of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A single value, sent as-is
    Scalar(String),
    /// A sequence: `(a,b)` for `in`, `{a,b}` for array operators
    List(Vec<String>),
    /// A JSON document for `cs`/`cd` on json/jsonb columns
    Json(Value),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Scalar(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::List(values)
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        FilterValue::Json(value)
    }
}

/// A single `column=operator.value` predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    pub negated: bool,
}

impl Filter {
    /// Creates a filter, rejecting values the operator cannot carry.
    ///
    /// Lists must be non-empty and are only valid for `in`, `cs`, `cd` and
    /// `ov`; `in` only takes a list; JSON documents only go with `cs`/`cd`.
    /// A scalar in list or JSON syntax for `cs`/`cd`/`ov` is stored the way
    /// [`parse`](Self::parse) reads it back.
    pub fn new(
        column: &str,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Result<Self, PostgrestError> {
        let value = match value.into() {
            FilterValue::Scalar(raw)
                if operator != FilterOperator::In
                    && (operator.accepts_list() || operator.accepts_json()) =>
            {
                decode_value(&operator, &raw)?
            }
            other => other,
        };
        match &value {
            FilterValue::List(values) if values.is_empty() => {
                return Err(PostgrestError::invalid(format!(
                    "Empty value list for {} filter on column {}",
                    operator.keyword(),
                    column
                )));
            }
            FilterValue::List(_) if !operator.accepts_list() => {
                return Err(PostgrestError::invalid(format!(
                    "Operator {} does not accept a list of values",
                    operator.keyword()
                )));
            }
            FilterValue::Json(_) if !operator.accepts_json() => {
                return Err(PostgrestError::invalid(format!(
                    "Operator {} does not accept a JSON value",
                    operator.keyword()
                )));
            }
            FilterValue::Json(json) if !json.is_object() && !json.is_array() => {
                return Err(PostgrestError::invalid(format!(
                    "The {} filter on column {} needs a JSON object or array, got {}",
                    operator.keyword(),
                    column,
                    json
                )));
            }
            FilterValue::Scalar(_) if operator == FilterOperator::In => {
                return Err(PostgrestError::invalid(format!(
                    "The in filter on column {} needs a list of values",
                    column
                )));
            }
            _ => {}
        }

        Ok(Self::scalar_unchecked(column, operator, value))
    }

    fn scalar_unchecked(column: &str, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value,
            negated: false,
        }
    }

    fn scalar<V: ToString>(column: &str, operator: FilterOperator, value: V) -> Self {
        Self::scalar_unchecked(column, operator, FilterValue::Scalar(value.to_string()))
    }

    pub fn eq<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Eq, value)
    }

    pub fn neq<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Neq, value)
    }

    pub fn gt<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Gt, value)
    }

    pub fn gte<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Gte, value)
    }

    pub fn lt<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Lt, value)
    }

    pub fn lte<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Lte, value)
    }

    /// `%` wildcards are rewritten to PostgREST's URL-safe `*`
    pub fn like(column: &str, pattern: &str) -> Self {
        Self::scalar(column, FilterOperator::Like, pattern.replace('%', "*"))
    }

    pub fn ilike(column: &str, pattern: &str) -> Self {
        Self::scalar(column, FilterOperator::ILike, pattern.replace('%', "*"))
    }

    pub fn is<V: ToString>(column: &str, value: V) -> Self {
        Self::scalar(column, FilterOperator::Is, value)
    }

    pub fn in_list<V: ToString>(column: &str, values: &[V]) -> Result<Self, PostgrestError> {
        Self::new(column, FilterOperator::In, to_strings(values))
    }

    /// Negates the filter (`not.` prefix); negating twice cancels out
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// The value of the top-level query parameter, e.g. `not.in.(1,2)`
    pub fn encode_value(&self) -> String {
        let value = match &self.value {
            FilterValue::Scalar(value) => value.clone(),
            other => encode_compound(&self.operator, other),
        };
        self.with_operator(&value)
    }

    /// `(column, operator.value)` query parameter pair
    pub fn to_param(&self) -> (String, String) {
        (self.column.clone(), self.encode_value())
    }

    /// Member of a logic group, e.g. `age.not.gte.18`
    fn encode_nested(&self) -> String {
        let value = match &self.value {
            FilterValue::Scalar(value) => quote_element(value).into_owned(),
            FilterValue::Json(json) => quote_element(&json.to_string()).into_owned(),
            list => encode_compound(&self.operator, list),
        };
        format!("{}.{}", self.column, self.with_operator(&value))
    }

    fn with_operator(&self, value: &str) -> String {
        if self.negated {
            format!("not.{}.{}", self.operator, value)
        } else {
            format!("{}.{}", self.operator, value)
        }
    }

    /// Reads a filter back from its column and encoded parameter value
    pub fn parse(column: &str, raw: &str) -> Result<Self, PostgrestError> {
        let (negated, rest) = match raw.strip_prefix("not.") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (token, value) = split_operator(rest).ok_or_else(|| {
            PostgrestError::invalid(format!("Missing operator in filter value: {}", raw))
        })?;
        let operator: FilterOperator = token.parse()?;
        let value = decode_value(&operator, value)?;

        let mut filter = Self::new(column, operator, value)?;
        filter.negated = negated;
        Ok(filter)
    }
}

/// Logical combinator for a group of conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOperator {
    And,
    Or,
}

impl LogicOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicOperator::And => "and",
            LogicOperator::Or => "or",
        }
    }
}

/// A filter or a (possibly nested, possibly negated) logic group
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Filter(Filter),
    Group {
        operator: LogicOperator,
        conditions: Vec<Condition>,
        negated: bool,
    },
}

impl Condition {
    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Group {
            operator: LogicOperator::Or,
            conditions,
            negated: false,
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::Group {
            operator: LogicOperator::And,
            conditions,
            negated: false,
        }
    }

    pub fn not(self) -> Self {
        match self {
            Condition::Filter(filter) => Condition::Filter(filter.not()),
            Condition::Group {
                operator,
                conditions,
                negated,
            } => Condition::Group {
                operator,
                conditions,
                negated: !negated,
            },
        }
    }

    /// Top-level query parameter for this condition.
    ///
    /// Groups are keyed by their combinator (`or`, `not.and`, …) and fail when
    /// any group in the tree is empty.
    pub fn to_param(&self) -> Result<(String, String), PostgrestError> {
        self.validate()?;
        match self {
            Condition::Filter(filter) => Ok(filter.to_param()),
            Condition::Group {
                operator,
                conditions,
                negated,
            } => Ok((
                negate_key(operator.as_str(), *negated),
                format!("({})", join_nested(conditions)),
            )),
        }
    }

    fn validate(&self) -> Result<(), PostgrestError> {
        match self {
            Condition::Filter(_) => Ok(()),
            Condition::Group {
                operator,
                conditions,
                ..
            } => {
                if conditions.is_empty() {
                    return Err(PostgrestError::invalid(format!(
                        "Empty {} group",
                        operator.as_str()
                    )));
                }
                conditions.iter().try_for_each(Condition::validate)
            }
        }
    }

    fn encode_nested(&self) -> String {
        match self {
            Condition::Filter(filter) => filter.encode_nested(),
            Condition::Group {
                operator,
                conditions,
                negated,
            } => format!(
                "{}({})",
                negate_key(operator.as_str(), *negated),
                join_nested(conditions)
            ),
        }
    }
}

impl From<Filter> for Condition {
    fn from(filter: Filter) -> Self {
        Condition::Filter(filter)
    }
}

fn negate_key(key: &str, negated: bool) -> String {
    if negated {
        format!("not.{}", key)
    } else {
        key.to_string()
    }
}

fn join_nested(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .map(Condition::encode_nested)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn to_strings<V: ToString>(values: &[V]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Wraps a list element or group member in double quotes when it contains
/// reserved characters or whitespace
pub fn quote_element(value: &str) -> Cow<'_, str> {
    let reserved = value.is_empty()
        || value
            .chars()
            .any(|c| RESERVED.contains(&c) || c.is_whitespace());
    if !reserved {
        return Cow::Borrowed(value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

fn encode_compound(operator: &FilterOperator, value: &FilterValue) -> String {
    match value {
        FilterValue::Scalar(value) => value.clone(),
        FilterValue::Json(json) => json.to_string(),
        FilterValue::List(values) => {
            let joined = values
                .iter()
                .map(|v| quote_element(v))
                .collect::<Vec<_>>()
                .join(",");
            if *operator == FilterOperator::In {
                format!("({})", joined)
            } else {
                format!("{{{}}}", joined)
            }
        }
    }
}

/// Splits `operator.value` at the first dot outside a `(config)` suffix
fn split_operator(raw: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => return Some((&raw[..i], &raw[i + 1..])),
            _ => {}
        }
    }
    None
}

fn decode_value(operator: &FilterOperator, raw: &str) -> Result<FilterValue, PostgrestError> {
    if *operator == FilterOperator::In {
        let inner = raw
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| {
                PostgrestError::invalid(format!("The in filter needs (..) delimiters: {}", raw))
            })?;
        return Ok(FilterValue::List(split_list(inner)?));
    }

    if operator.accepts_json() && (raw.starts_with('{') || raw.starts_with('[')) {
        if let Ok(json) = serde_json::from_str::<Value>(raw) {
            if json.is_object() || json.is_array() {
                return Ok(FilterValue::Json(json));
            }
        }
    }

    if operator.accepts_list() {
        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            return Ok(FilterValue::List(split_list(inner)?));
        }
    }

    Ok(FilterValue::Scalar(raw.to_string()))
}

/// Splits a comma separated list, honouring double quotes and backslash escapes
fn split_list(inner: &str) -> Result<Vec<String>, PostgrestError> {
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err(PostgrestError::invalid("Dangling escape in list value")),
            },
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err(PostgrestError::invalid(format!(
            "Unterminated quote in list value: {}",
            inner
        )));
    }
    items.push(current);
    Ok(items)
}
