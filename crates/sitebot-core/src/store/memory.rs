//! In-process [`Store`] backend.
//!
//! Rows get an auto-increment integer `id` and an RFC 3339 `created_at` when
//! the caller does not supply them. Every insert/update/delete call is counted
//! so tests can assert that a code path wrote nothing.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;

use super::{Filter, Query, Row, Store};
use crate::error::Result;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    next_id: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert, update and delete calls made so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(AtomicOrdering::SeqCst)
    }

    /// All rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().rows.get(table).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        self.bump();
        let mut tables = self.lock();
        let Tables { rows, next_id } = &mut *tables;
        let existing = rows.entry(table.to_string()).or_default();

        let counter = next_id.entry(table.to_string()).or_insert(1);
        match row.get("id").and_then(Value::as_i64) {
            Some(id) => *counter = (*counter).max(id + 1),
            None if !row.contains_key("id") => {
                row.insert("id".into(), Value::from(*counter));
                *counter += 1;
            }
            None => {}
        }
        if !row.contains_key("created_at") {
            row.insert("created_at".into(), Value::String(now_rfc3339()));
        }
        existing.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        self.bump();
        let mut tables = self.lock();
        let mut updated = Vec::new();
        if let Some(rows) = tables.rows.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches_all(r, filters)) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        self.bump();
        let mut tables = self.lock();
        let Some(rows) = tables.rows.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches_all(r, filters));
        Ok(before - rows.len())
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let tables = self.lock();
        let mut out: Vec<Row> = tables
            .rows
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_all(r, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        if !query.order.is_empty() {
            out.sort_by(|a, b| {
                for order in &query.order {
                    let ord = compare(
                        a.get(&order.column).unwrap_or(&Value::Null),
                        b.get(&order.column).unwrap_or(&Value::Null),
                    );
                    let ord = if order.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, table: &str) -> Result<u64> {
        Ok(self.lock().rows.get(table).map_or(0, |r| r.len() as u64))
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

fn matches(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(col, value) => row.get(col).is_some_and(|v| loosely_equal(v, value)),
        Filter::ILike(col, pattern) => row
            .get(col)
            .and_then(Value::as_str)
            .is_some_and(|s| ilike(s, pattern)),
        Filter::In(col, values) => row
            .get(col)
            .is_some_and(|v| values.iter().any(|candidate| loosely_equal(v, candidate))),
        Filter::Lt(col, value) => row
            .get(col)
            .is_some_and(|v| compare(v, value) == Ordering::Less),
    }
}

/// Numbers compare by value so `1` and `1.0` are the same id.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ilike(value: &str, pattern: &str) -> bool {
    let body = pattern
        .split('%')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?is)^{body}$"))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
