//! Full-collection snapshot mirror.
//!
//! After a successful mutation the whole collection is re-read and committed
//! to the repository as `content/<table>.json`. The commit is a secondary
//! write: it runs on a background worker fed by an outbox channel, retries a
//! bounded number of times, and only ever logs its failures. The primary
//! store write never waits for it and is never rolled back by it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::collection::Collection;
use crate::error::{Result, SiteError};
use crate::repo::{CommitRef, Repository};
use crate::store::{Query, Store};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

pub struct SnapshotMirror {
    store: Arc<dyn Store>,
    repo: Arc<dyn Repository>,
}

impl SnapshotMirror {
    pub fn new(store: Arc<dyn Store>, repo: Arc<dyn Repository>) -> Self {
        Self { store, repo }
    }

    /// Commit the current contents of `collection` as one JSON array ordered
    /// by id.
    pub async fn snapshot(&self, collection: Collection, message: &str) -> Result<CommitRef> {
        let path = collection
            .snapshot_path()
            .ok_or(SiteError::NotConfigured("snapshot path for bookkeeping table"))?;
        let rows = self
            .store
            .select(collection.table(), &Query::new().order_asc("id"))
            .await?;
        let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        let mut body = serde_json::to_vec_pretty(&rows)?;
        body.push(b'\n');

        let current = self.repo.get_file(&path, None).await?;
        let commit = self
            .repo
            .put_file(&path, &body, message, current.as_ref().map(|f| f.sha.as_str()))
            .await?;
        info!(sha = %commit.sha, path = %path, "mirrored collection snapshot");
        Ok(commit)
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorJob {
    pub collection: Collection,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub committed: usize,
    pub failed: usize,
}

/// Sending half of the mirror queue. Cheap to clone.
#[derive(Clone)]
pub struct MirrorOutbox {
    tx: mpsc::UnboundedSender<MirrorJob>,
}

impl MirrorOutbox {
    /// Queue a snapshot. Never blocks; a stopped worker only loses the job.
    pub fn submit(&self, job: MirrorJob) {
        if let Err(e) = self.tx.send(job) {
            warn!(collection = %e.0.collection, "mirror worker stopped, snapshot dropped");
        }
    }
}

pub struct MirrorWorker {
    handle: JoinHandle<MirrorReport>,
}

impl MirrorWorker {
    /// Wait for the queue to drain. Completes once every [`MirrorOutbox`]
    /// clone has been dropped.
    pub async fn finish(self) -> MirrorReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "mirror worker panicked");
                MirrorReport::default()
            }
        }
    }
}

/// Start the background worker. Each job is tried once plus `retries` more
/// times, backing off linearly between attempts.
pub fn spawn_outbox(mirror: Arc<SnapshotMirror>, retries: u32) -> (MirrorOutbox, MirrorWorker) {
    let (tx, mut rx) = mpsc::unbounded_channel::<MirrorJob>();
    let handle = tokio::spawn(async move {
        let mut report = MirrorReport::default();
        while let Some(job) = rx.recv().await {
            if run_job(&mirror, &job, retries).await {
                report.committed += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    });
    (MirrorOutbox { tx }, MirrorWorker { handle })
}

async fn run_job(mirror: &SnapshotMirror, job: &MirrorJob, retries: u32) -> bool {
    let mut attempt = 0u32;
    loop {
        match mirror.snapshot(job.collection, &job.message).await {
            Ok(_) => return true,
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(collection = %job.collection, attempt, error = %e, "mirror commit failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            Err(e) => {
                warn!(collection = %job.collection, error = %e, "mirror commit failed, giving up");
                return false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryRepository;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for label in ["Volunteers", "Meals"] {
            let mut row = crate::store::Row::new();
            row.insert("label".into(), json!(label));
            row.insert("value".into(), json!(10));
            store.insert("stats", row).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn snapshot_writes_whole_collection() {
        let store = seeded_store().await;
        let repo = Arc::new(MemoryRepository::new());
        let mirror = SnapshotMirror::new(store, repo.clone());

        mirror
            .snapshot(Collection::Stats, "sitebot: update_stat Meals")
            .await
            .unwrap();
        // A second snapshot overwrites using the current blob hash.
        mirror
            .snapshot(Collection::Stats, "sitebot: update_stat Meals")
            .await
            .unwrap();

        let body = repo.head_file("content/stats.json").unwrap();
        let rows: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["label"], "Volunteers");
        assert_eq!(repo.commit_count(), 2);
    }

    #[tokio::test]
    async fn bookkeeping_tables_are_not_mirrored() {
        let mirror = SnapshotMirror::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRepository::new()),
        );
        assert!(mirror
            .snapshot(Collection::PendingActions, "m")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn outbox_counts_commits_and_failures() {
        let store = seeded_store().await;
        let repo = Arc::new(MemoryRepository::new());
        repo.fail_writes_after(1);
        let mirror = Arc::new(SnapshotMirror::new(store, repo.clone()));
        let (outbox, worker) = spawn_outbox(mirror, 0);

        for _ in 0..2 {
            outbox.submit(MirrorJob {
                collection: Collection::Stats,
                message: "sitebot: update_stat".into(),
            });
        }
        drop(outbox);

        let report = worker.finish().await;
        assert_eq!(report, MirrorReport { committed: 1, failed: 1 });
        assert_eq!(repo.commit_count(), 1);
    }
}
