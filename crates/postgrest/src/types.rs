//! Option types and the `Prefer` header composer

use std::fmt;

/// Count options for queries (`Prefer: count=...`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMethod {
    /// Exact count
    Exact,

    /// Planned count (from the query planner)
    Planned,

    /// Estimated count (exact for small tables, planned above a threshold)
    Estimated,
}

impl CountMethod {
    /// Convert the option to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CountMethod::Exact => "exact",
            CountMethod::Planned => "planned",
            CountMethod::Estimated => "estimated",
        }
    }
}

/// Options for returning data (`Prefer: return=...`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMethod {
    /// Return no body
    Minimal,

    /// Return headers only (`Location` for inserts)
    HeadersOnly,

    /// Return the affected rows
    #[default]
    Representation,
}

impl ReturnMethod {
    /// Convert the option to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnMethod::Minimal => "minimal",
            ReturnMethod::HeadersOnly => "headers-only",
            ReturnMethod::Representation => "representation",
        }
    }
}

/// How an upsert treats rows that collide with an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    MergeDuplicates,
    IgnoreDuplicates,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::MergeDuplicates => "merge-duplicates",
            Resolution::IgnoreDuplicates => "ignore-duplicates",
        }
    }
}

/// Directives of the `Prefer` request header.
///
/// Rendered in a fixed order: `return`, `count`, `resolution`, `missing`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefer {
    pub returning: Option<ReturnMethod>,
    pub count: Option<CountMethod>,
    pub resolution: Option<Resolution>,
    /// Fill columns missing from the payload with their defaults
    pub missing_default: bool,
}

impl Prefer {
    /// Header value, or `None` when no directive is set
    pub fn header_value(&self) -> Option<String> {
        let mut directives = Vec::new();
        if let Some(returning) = self.returning {
            directives.push(format!("return={}", returning.as_str()));
        }
        if let Some(count) = self.count {
            directives.push(format!("count={}", count.as_str()));
        }
        if let Some(resolution) = self.resolution {
            directives.push(format!("resolution={}", resolution.as_str()));
        }
        if self.missing_default {
            directives.push("missing=default".to_string());
        }

        if directives.is_empty() {
            None
        } else {
            Some(directives.join(","))
        }
    }
}

impl fmt::Display for Prefer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value().unwrap_or_default())
    }
}

/// Options for `insert`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOptions {
    pub count: Option<CountMethod>,
    pub returning: ReturnMethod,
    /// Turn the insert into a merging upsert
    pub upsert: bool,
    /// When false, missing columns take their default value instead of NULL
    pub default_to_null: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            count: None,
            returning: ReturnMethod::Representation,
            upsert: false,
            default_to_null: true,
        }
    }
}

impl InsertOptions {
    pub fn with_count(mut self, count: CountMethod) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_returning(mut self, returning: ReturnMethod) -> Self {
        self.returning = returning;
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn with_default_to_null(mut self, value: bool) -> Self {
        self.default_to_null = value;
        self
    }

    pub(crate) fn prefer(&self) -> Prefer {
        Prefer {
            returning: Some(self.returning),
            count: self.count,
            resolution: self.upsert.then_some(Resolution::MergeDuplicates),
            missing_default: !self.default_to_null,
        }
    }
}

/// Options for `upsert`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOptions {
    pub count: Option<CountMethod>,
    pub returning: ReturnMethod,
    /// Skip colliding rows instead of merging them
    pub ignore_duplicates: bool,
    /// Columns of the unique constraint to resolve conflicts on
    pub on_conflict: Option<String>,
    pub default_to_null: bool,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            count: None,
            returning: ReturnMethod::Representation,
            ignore_duplicates: false,
            on_conflict: None,
            default_to_null: true,
        }
    }
}

impl UpsertOptions {
    pub fn with_count(mut self, count: CountMethod) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_returning(mut self, returning: ReturnMethod) -> Self {
        self.returning = returning;
        self
    }

    pub fn with_ignore_duplicates(mut self, value: bool) -> Self {
        self.ignore_duplicates = value;
        self
    }

    pub fn with_on_conflict(mut self, columns: &str) -> Self {
        self.on_conflict = Some(columns.to_string());
        self
    }

    pub fn with_default_to_null(mut self, value: bool) -> Self {
        self.default_to_null = value;
        self
    }

    pub(crate) fn prefer(&self) -> Prefer {
        let resolution = if self.ignore_duplicates {
            Resolution::IgnoreDuplicates
        } else {
            Resolution::MergeDuplicates
        };
        Prefer {
            returning: Some(self.returning),
            count: self.count,
            resolution: Some(resolution),
            missing_default: !self.default_to_null,
        }
    }
}

/// Options for `update` and `delete`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOptions {
    pub count: Option<CountMethod>,
    pub returning: ReturnMethod,
}

impl MutationOptions {
    pub fn with_count(mut self, count: CountMethod) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_returning(mut self, returning: ReturnMethod) -> Self {
        self.returning = returning;
        self
    }

    pub(crate) fn prefer(&self) -> Prefer {
        Prefer {
            returning: Some(self.returning),
            count: self.count,
            ..Prefer::default()
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One entry of an `order` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
    pub nulls_first: Option<bool>,
    /// Embedded resource the ordering applies to
    pub referenced_table: Option<String>,
}

impl Order {
    pub fn new(column: &str, order: SortOrder) -> Self {
        Self {
            column: column.to_string(),
            ascending: order == SortOrder::Ascending,
            nulls_first: None,
            referenced_table: None,
        }
    }

    pub fn asc(column: &str) -> Self {
        Self::new(column, SortOrder::Ascending)
    }

    pub fn desc(column: &str) -> Self {
        Self::new(column, SortOrder::Descending)
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = Some(true);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_first = Some(false);
        self
    }

    pub fn on(mut self, referenced_table: &str) -> Self {
        self.referenced_table = Some(referenced_table.to_string());
        self
    }

    /// `column.asc`, `column.desc.nullsfirst`, ...
    pub fn encode(&self) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        match self.nulls_first {
            Some(true) => format!("{}.{}.nullsfirst", self.column, direction),
            Some(false) => format!("{}.{}.nullslast", self.column, direction),
            None => format!("{}.{}", self.column, direction),
        }
    }
}

/// A row type bound to a database table, for `PostgrestClient::from_model`
pub trait Table {
    /// このテーブルの名前
    fn table_name() -> &'static str;
}
