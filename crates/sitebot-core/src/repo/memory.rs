//! In-process [`Repository`] with real commit semantics.
//!
//! Every write or delete appends a commit holding a full snapshot of the tree.
//! Blob hashes are SHA-256 of the file bytes, so writes and deletes enforce
//! the same prior-hash rules as the hosted API. `get_commit` derives the
//! changed-file list by diffing a commit's tree against its parent's.
//! Renames are never detected; a move shows up as one removal plus one
//! addition.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{
    ChangedFile, CommitDetail, CommitRef, CommitSummary, FileStatus, RepoFile, Repository,
};
use crate::error::{Result, SiteError};

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct MemCommit {
    sha: String,
    message: String,
    parent: Option<String>,
    tree: Tree,
}

#[derive(Default)]
struct Inner {
    commits: Vec<MemCommit>,
    /// Remaining successful writes before every write fails.
    writes_before_failure: Option<usize>,
}

#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

pub fn blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"blob\0");
    hasher.update(content);
    hex::encode(hasher.finalize())
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository whose first (parentless) commit holds `files`.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let repo = Self::new();
        let tree: Tree = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        repo.lock().push_commit("initial import", tree);
        repo
    }

    /// Land several file changes as one commit, the way an ordinary push
    /// would. `None` content deletes the path. Returns the new commit sha.
    pub fn push<I, P>(&self, message: &str, changes: I) -> String
    where
        I: IntoIterator<Item = (P, Option<Vec<u8>>)>,
        P: Into<String>,
    {
        let mut inner = self.lock();
        let mut tree = inner.head_tree();
        for (path, content) in changes {
            let path: String = path.into();
            match content {
                Some(bytes) => tree.insert(path, bytes),
                None => tree.remove(&path),
            };
        }
        inner.push_commit(message, tree)
    }

    /// Make every write after the next `n` successful ones fail with a 500.
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().writes_before_failure = Some(n);
    }

    pub fn head_sha(&self) -> Option<String> {
        self.lock().commits.last().map(|c| c.sha.clone())
    }

    pub fn commit_count(&self) -> usize {
        self.lock().commits.len()
    }

    /// Content of `path` at the branch head.
    pub fn head_file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().head_tree().get(path).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn head_tree(&self) -> Tree {
        self.commits
            .last()
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    fn find(&self, sha: &str) -> Result<&MemCommit> {
        self.commits
            .iter()
            .find(|c| c.sha == sha)
            .ok_or_else(|| SiteError::Remote {
                status: 404,
                body: format!("No commit found for SHA: {sha}"),
            })
    }

    fn push_commit(&mut self, message: &str, tree: Tree) -> String {
        let parent = self.commits.last().map(|c| c.sha.clone());
        let mut hasher = Sha256::new();
        hasher.update(parent.as_deref().unwrap_or("").as_bytes());
        hasher.update(message.as_bytes());
        hasher.update(self.commits.len().to_be_bytes());
        for (path, content) in &tree {
            hasher.update(path.as_bytes());
            hasher.update(blob_sha(content).as_bytes());
        }
        let sha = hex::encode(hasher.finalize());
        self.commits.push(MemCommit {
            sha: sha.clone(),
            message: message.to_string(),
            parent,
            tree,
        });
        sha
    }

    fn take_write_budget(&mut self) -> Result<()> {
        match self.writes_before_failure {
            Some(0) => Err(SiteError::Remote {
                status: 500,
                body: "injected write failure".into(),
            }),
            Some(n) => {
                self.writes_before_failure = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn diff(parent: &Tree, tree: &Tree) -> Vec<ChangedFile> {
    let mut files = Vec::new();
    for (path, content) in tree {
        let status = match parent.get(path) {
            None => Some(FileStatus::Added),
            Some(old) if old != content => Some(FileStatus::Modified),
            Some(_) => None,
        };
        if let Some(status) = status {
            files.push(ChangedFile {
                filename: path.clone(),
                status,
                previous_filename: None,
            });
        }
    }
    for path in parent.keys().filter(|p| !tree.contains_key(*p)) {
        files.push(ChangedFile {
            filename: path.clone(),
            status: FileStatus::Removed,
            previous_filename: None,
        });
    }
    files
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_file(&self, path: &str, git_ref: Option<&str>) -> Result<Option<RepoFile>> {
        let inner = self.lock();
        let tree = match git_ref {
            Some(sha) => inner.find(sha)?.tree.clone(),
            None => inner.head_tree(),
        };
        Ok(tree.get(path).map(|content| RepoFile {
            path: path.to_string(),
            sha: blob_sha(content),
            content: content.clone(),
        }))
    }

    async fn put_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        prior_sha: Option<&str>,
    ) -> Result<CommitRef> {
        let mut inner = self.lock();
        inner.take_write_budget()?;
        let mut tree = inner.head_tree();
        match (tree.get(path), prior_sha) {
            (Some(_), None) => {
                return Err(SiteError::Remote {
                    status: 422,
                    body: format!("\"sha\" wasn't supplied for existing file {path}"),
                })
            }
            (Some(existing), Some(prior)) if blob_sha(existing) != prior => {
                return Err(SiteError::Remote {
                    status: 409,
                    body: format!("{path} does not match {prior}"),
                })
            }
            _ => {}
        }
        tree.insert(path.to_string(), content.to_vec());
        let sha = inner.push_commit(message, tree);
        Ok(CommitRef { sha })
    }

    async fn delete_file(&self, path: &str, message: &str, sha: &str) -> Result<CommitRef> {
        let mut inner = self.lock();
        inner.take_write_budget()?;
        let mut tree = inner.head_tree();
        match tree.get(path) {
            None => {
                return Err(SiteError::Remote {
                    status: 404,
                    body: format!("{path} not found"),
                })
            }
            Some(existing) if blob_sha(existing) != sha => {
                return Err(SiteError::Remote {
                    status: 409,
                    body: format!("{path} does not match {sha}"),
                })
            }
            Some(_) => {}
        }
        tree.remove(path);
        let commit = inner.push_commit(message, tree);
        Ok(CommitRef { sha: commit })
    }

    async fn list_commits(&self, path: Option<&str>, limit: usize) -> Result<Vec<CommitSummary>> {
        let inner = self.lock();
        let empty = Tree::new();
        let mut out = Vec::new();
        for commit in inner.commits.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let touches = match path {
                None => true,
                Some(p) => {
                    let parent_tree = match &commit.parent {
                        Some(parent) => &inner.find(parent)?.tree,
                        None => &empty,
                    };
                    parent_tree.get(p) != commit.tree.get(p)
                }
            };
            if touches {
                out.push(CommitSummary {
                    sha: commit.sha.clone(),
                    message: commit.message.clone(),
                    author: Some("sitebot".into()),
                    date: None,
                });
            }
        }
        Ok(out)
    }

    async fn get_commit(&self, sha: &str) -> Result<CommitDetail> {
        let inner = self.lock();
        let commit = inner.find(sha)?;
        let files = match &commit.parent {
            Some(parent) => diff(&inner.find(parent)?.tree, &commit.tree),
            None => diff(&Tree::new(), &commit.tree),
        };
        Ok(CommitDetail {
            sha: commit.sha.clone(),
            message: commit.message.clone(),
            parent_sha: commit.parent.clone(),
            files,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
