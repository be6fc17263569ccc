//! Port for request/response access to the hosted record store.
//!
//! The store exposes named collections (one per category plus the
//! notifications collection). Reads are filtered queries; writes are partial
//! updates by primary key and plain inserts.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::define_port_error;

define_port_error! {
    /// Errors raised by record gateway and change feed adapters.
    pub enum GatewayError {
        /// The request never reached the store or the connection dropped.
        Transport { message: String } =>
            "gateway transport failed: {message}",
        /// The store answered with a non-success status.
        Rejected { status: u16, message: String } =>
            "gateway rejected the request with status {status}: {message}",
        /// The response body could not be decoded.
        Decode { message: String } =>
            "gateway response could not be decoded: {message}",
        /// A change subscription could not be opened or closed.
        Subscription { message: String } =>
            "change subscription failed: {message}",
    }
}

/// Row predicate understood by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = value`.
    Eq { column: String, value: String },
    /// `column <> value`; rows where the column is null do not match.
    Neq { column: String, value: String },
    /// `column IN (values)`.
    In { column: String, values: Vec<String> },
    /// `NOT (column = value)`; rows where the column is null do match.
    NotEq { column: String, value: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn neq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Neq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotEq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Column the filter applies to.
    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. }
            | Self::Neq { column, .. }
            | Self::In { column, .. }
            | Self::NotEq { column, .. } => column.as_str(),
        }
    }

    /// Evaluate the filter against a JSON row.
    ///
    /// Scalars are compared by their string form, so `42` matches `"42"`.
    pub fn matches(&self, row: &Value) -> bool {
        let cell = row.get(self.column()).and_then(scalar_text);
        match self {
            Self::Eq { value, .. } => cell.as_deref() == Some(value.as_str()),
            Self::Neq { value, .. } => cell.is_some_and(|cell| cell != *value),
            Self::In { values, .. } => cell.is_some_and(|cell| values.contains(&cell)),
            Self::NotEq { value, .. } => cell.as_deref() != Some(value.as_str()),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Result ordering for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Filtered, ordered, optionally limited read against one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Start a query against `table` with no filters.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row satisfies every filter of the query.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }
}

/// Port for reading and writing rows in the hosted record store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordGateway: Send + Sync {
    /// Run a filtered query and return the matching rows.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Value>, GatewayError>;

    /// Apply a partial update to the row identified by `id`.
    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<(), GatewayError>;

    /// Insert a new row.
    async fn insert(&self, table: &str, record: &Value) -> Result<(), GatewayError>;
}

/// Fixture implementation for tests that do not exercise the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRecordGateway;

#[async_trait]
impl RecordGateway for FixtureRecordGateway {
    async fn query(&self, _query: &RecordQuery) -> Result<Vec<Value>, GatewayError> {
        Ok(Vec::new())
    }

    async fn update(
        &self,
        _table: &str,
        _id: &str,
        _patch: &Map<String, Value>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn insert(&self, _table: &str, _record: &Value) -> Result<(), GatewayError> {
        Ok(())
    }
}
