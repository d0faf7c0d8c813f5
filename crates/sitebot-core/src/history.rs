//! Bounded pre-image log and single-step undo.
//!
//! Layout: one `content_history` row per captured pre-image:
//! `{ id, table_name, record_id, previous_data, created_at }`.
//!
//! Entries are written immediately before a section-content edit. After each
//! insert everything older than the `retention` most recent entries is
//! deleted, so the log can briefly exceed `retention` between a burst of
//! writes and the next cleanup but settles back to it. Undo always consumes
//! the newest surviving entry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::collection::Collection;
use crate::error::Result;
use crate::store::{row_id, Filter, Query, Row, Store};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Value,
    pub table_name: String,
    pub record_id: Value,
    pub previous_data: Row,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    NothingToUndo,
    Restored {
        table: String,
        record_id: Value,
        section: Option<String>,
    },
    /// The record the entry points at no longer exists. The entry is still
    /// consumed so the next undo can reach older ones.
    RecordGone { table: String, record_id: Value },
}

impl UndoOutcome {
    pub fn message(&self) -> String {
        match self {
            UndoOutcome::NothingToUndo => "Nothing to undo.".to_string(),
            UndoOutcome::Restored {
                section: Some(section),
                ..
            } => format!("Restored the previous version of '{section}'."),
            UndoOutcome::Restored {
                table, record_id, ..
            } => format!("Restored the previous version of record {record_id} in {table}."),
            UndoOutcome::RecordGone { table, record_id } => {
                format!("Nothing restored: record {record_id} in {table} no longer exists.")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub struct History {
    store: Arc<dyn Store>,
    retention: usize,
}

impl History {
    pub fn new(store: Arc<dyn Store>, retention: usize) -> Self {
        Self { store, retention }
    }

    fn table() -> &'static str {
        Collection::ContentHistory.table()
    }

    fn newest_first() -> Query {
        Query::new().order_desc("created_at").order_desc("id")
    }

    /// Capture the pre-image of `record_id` in `table`, then evict entries
    /// beyond the retention window.
    pub async fn record(&self, table: &str, record_id: Value, previous: &Row) -> Result<()> {
        let mut previous_data = previous.clone();
        previous_data.remove("id");

        let mut row = Row::new();
        row.insert("table_name".into(), Value::from(table));
        row.insert("record_id".into(), record_id);
        row.insert("previous_data".into(), Value::Object(previous_data));
        self.store.insert(Self::table(), row).await?;

        self.evict().await
    }

    async fn evict(&self) -> Result<()> {
        let stale = self
            .store
            .select(Self::table(), &Self::newest_first().offset(self.retention))
            .await?;
        if stale.is_empty() {
            return Ok(());
        }
        let ids: Vec<Value> = stale.iter().map(row_id).collect();
        let removed = self
            .store
            .delete(Self::table(), &[Filter::is_in("id", ids)])
            .await?;
        debug!(removed, retention = self.retention, "evicted history entries");
        Ok(())
    }

    /// The newest surviving entry, if any.
    pub async fn latest(&self) -> Result<Option<HistoryEntry>> {
        let mut rows = self
            .store
            .select(Self::table(), &Self::newest_first().limit(1))
            .await?;
        match rows.pop() {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }

    /// Restore the record named by the newest entry and consume the entry.
    ///
    /// An empty log is not an error: it yields `NothingToUndo` and writes
    /// nothing.
    pub async fn undo(&self) -> Result<UndoOutcome> {
        let Some(entry) = self.latest().await? else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        let section = entry
            .previous_data
            .get("section")
            .and_then(Value::as_str)
            .map(str::to_string);

        let restored = self
            .store
            .update(
                &entry.table_name,
                &[Filter::Eq("id".into(), entry.record_id.clone())],
                entry.previous_data.clone(),
            )
            .await?;
        self.store
            .delete(Self::table(), &[Filter::Eq("id".into(), entry.id.clone())])
            .await?;

        if restored.is_empty() {
            warn!(table = %entry.table_name, record_id = %entry.record_id, "undo target is gone");
            return Ok(UndoOutcome::RecordGone {
                table: entry.table_name,
                record_id: entry.record_id,
            });
        }
        info!(table = %entry.table_name, record_id = %entry.record_id, "undo restored record");
        Ok(UndoOutcome::Restored {
            table: entry.table_name,
            record_id: entry.record_id,
            section,
        })
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.count(Self::table()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
