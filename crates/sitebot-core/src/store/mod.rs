//! Structured store contract.
//!
//! The engine never talks to a database directly. Every read and write goes
//! through [`Store`], a small table-oriented interface modelled on what a
//! PostgREST endpoint offers: insert, filtered update/delete, ordered and
//! limited select, and row counts. Rows are JSON objects.
//!
//! Two backends ship with the crate:
//!
//! - [`RestStore`] talks to a PostgREST-compatible HTTP endpoint.
//! - [`MemoryStore`] keeps tables in process; tests and local runs use it.
//!
//! Per-row atomicity is all the engine assumes. There is no transaction
//! spanning two calls.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SiteError};

pub use memory::MemoryStore;
pub use rest::RestStore;

pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Filters and queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value.
    Eq(String, Value),
    /// Case-insensitive pattern match; `%` matches any run of characters.
    ILike(String, String),
    /// Column is one of the values.
    In(String, Vec<Value>),
    /// Column is strictly less than value (numbers or RFC 3339 timestamps).
    Lt(String, Value),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::ILike(column.into(), pattern.into())
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In(column.into(), values)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(column.into(), value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            descending: false,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a row and return it as stored (with its assigned `id`).
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// Merge `patch` into every row matching all `filters`. Returns the
    /// updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>>;

    /// Delete every row matching all `filters`. Returns how many were removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize>;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    async fn count(&self, table: &str) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Select rows matching `filters` and require exactly one.
///
/// Zero or several matches are both `ExpectedSingleRow`; callers do not
/// disambiguate.
pub async fn select_single(store: &dyn Store, table: &str, filters: Vec<Filter>) -> Result<Row> {
    let query = Query {
        filters,
        ..Query::default()
    };
    let mut rows = store.select(table, &query).await?;
    if rows.len() != 1 {
        return Err(SiteError::ExpectedSingleRow {
            table: table.to_string(),
            matched: rows.len(),
        });
    }
    Ok(rows.remove(0))
}

/// The `id` column of a row, or `Null` when absent.
pub fn row_id(row: &Row) -> Value {
    row.get("id").cloned().unwrap_or(Value::Null)
}

/// Convert a JSON object value into a [`Row`].
pub fn into_row(value: Value) -> Result<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SiteError::Store {
            status: 0,
            body: format!("expected a JSON object row, got {other}"),
        }),
    }
}
