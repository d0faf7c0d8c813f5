//! Staged actions awaiting operator confirmation.
//!
//! Lifecycle: `propose` → `confirm` | `cancel`, with expiry detected lazily.
//! A conversation holds at most one pending row; proposing again replaces
//! it. A missing row on confirm is the normal "expired" outcome, not an
//! error. Rows older than the TTL are only removed by [`PendingActions::purge_expired`],
//! which callers run opportunistically.
//!
//! Confirmation is lookup, dispatch, delete with no lock in between, so two
//! confirmations racing on one id can both dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::action::Action;
use crate::collection::Collection;
use crate::dispatch::{ActionResult, Dispatcher};
use crate::error::{Result, SiteError};
use crate::store::{Filter, Query, Row, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub conversation_id: String,
    pub action_data: Value,
    pub description: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Nothing pending under that id: consumed, cancelled or purged.
    Expired,
    Executed {
        action: Value,
        result: ActionResult,
    },
}

pub struct PendingActions {
    store: Arc<dyn Store>,
}

impl PendingActions {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn table() -> &'static str {
        Collection::PendingActions.table()
    }

    /// Stage `action` for `conversation`, replacing whatever was pending
    /// there. Returns the new pending id.
    pub async fn propose(
        &self,
        conversation: &str,
        action: &Action,
        description: &str,
    ) -> Result<String> {
        let replaced = self
            .store
            .delete(Self::table(), &[Filter::eq("conversation_id", conversation)])
            .await?;
        if replaced > 0 {
            debug!(conversation, replaced, "replaced pending action");
        }

        let id = Uuid::new_v4().to_string();
        let mut row = Row::new();
        row.insert("id".into(), Value::from(id.as_str()));
        row.insert("conversation_id".into(), Value::from(conversation));
        row.insert("action_data".into(), action.to_value()?);
        row.insert("description".into(), Value::from(description));
        row.insert("created_at".into(), Value::from(now_rfc3339()));
        self.store.insert(Self::table(), row).await?;

        info!(pending_id = %id, conversation, action = action.tag(), "action proposed");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<PendingAction>> {
        let query = Query::new().filter(Filter::eq("id", id)).limit(1);
        let mut rows = self.store.select(Self::table(), &query).await?;
        match rows.pop() {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }

    /// Rows currently pending for `conversation` (zero or one).
    pub async fn for_conversation(&self, conversation: &str) -> Result<Vec<PendingAction>> {
        let query = Query::new().filter(Filter::eq("conversation_id", conversation));
        self.store
            .select(Self::table(), &query)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(SiteError::from))
            .collect()
    }

    /// Dispatch the pending action and delete its row whatever the outcome.
    ///
    /// An absent id writes nothing and yields [`ConfirmOutcome::Expired`].
    pub async fn confirm(&self, id: &str, dispatcher: &Dispatcher) -> Result<ConfirmOutcome> {
        let Some(pending) = self.get(id).await? else {
            debug!(pending_id = id, "confirm on missing pending action");
            return Ok(ConfirmOutcome::Expired);
        };

        let result = dispatcher.execute_value(pending.action_data.clone()).await;
        self.store
            .delete(Self::table(), &[Filter::eq("id", id)])
            .await?;

        info!(
            pending_id = id,
            conversation = %pending.conversation_id,
            success = result.success,
            "pending action confirmed"
        );
        Ok(ConfirmOutcome::Executed {
            action: pending.action_data,
            result,
        })
    }

    /// Drop the pending row without dispatching. Returns whether one existed.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(Self::table(), &[Filter::eq("id", id)])
            .await?;
        info!(pending_id = id, removed, "pending action cancelled");
        Ok(removed > 0)
    }

    /// Delete every pending row created more than `ttl` ago.
    pub async fn purge_expired(&self, ttl: Duration) -> Result<usize> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let cutoff = (Utc::now() - ttl).to_rfc3339_opts(SecondsFormat::Micros, true);
        let purged = self
            .store
            .delete(Self::table(), &[Filter::lt("created_at", cutoff)])
            .await?;
        if purged > 0 {
            info!(purged, "purged expired pending actions");
        }
        Ok(purged)
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.count(Self::table()).await
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
