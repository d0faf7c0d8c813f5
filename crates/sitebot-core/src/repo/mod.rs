//! Remote version-controlled repository.
//!
//! The engine only ever touches the repository through file-level writes and
//! deletes (each producing one commit) and read-only commit inspection. The
//! [`Repository`] trait captures exactly that surface.

pub mod github;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use github::GitHubRepository;
pub use memory::MemoryRepository;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A file as stored at some ref, with the blob hash required for
/// optimistic-concurrency writes and deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoFile {
    pub path: String,
    pub sha: String,
    pub content: Vec<u8>,
}

/// The commit produced by a write or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Renamed,
    /// `modified` and every status without a dedicated inverse (`changed`,
    /// `copied`, ...).
    #[serde(other)]
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub status: FileStatus,
    #[serde(default)]
    pub previous_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    pub message: String,
    pub parent_sha: Option<String>,
    pub files: Vec<ChangedFile>,
}

// ---------------------------------------------------------------------------
// Repository trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Repository: Send + Sync {
    /// Read `path` at `git_ref` (the configured branch head when `None`).
    /// A missing file is `Ok(None)`.
    async fn get_file(&self, path: &str, git_ref: Option<&str>) -> Result<Option<RepoFile>>;

    /// Create or overwrite `path`. `prior_sha` must be the current blob hash
    /// when the file already exists.
    async fn put_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        prior_sha: Option<&str>,
    ) -> Result<CommitRef>;

    async fn delete_file(&self, path: &str, message: &str, sha: &str) -> Result<CommitRef>;

    /// Newest-first commits on the branch, optionally only those touching
    /// `path`.
    async fn list_commits(&self, path: Option<&str>, limit: usize) -> Result<Vec<CommitSummary>>;

    async fn get_commit(&self, sha: &str) -> Result<CommitDetail>;
}
