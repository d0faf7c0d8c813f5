//! Commit-granular revert, run as a saga.
//!
//! Each changed file of the target commit is inverted in its own step, and
//! each step lands as its own commit:
//!
//! | change   | inverse                                                    |
//! |----------|------------------------------------------------------------|
//! | added    | delete the file (current hash read first)                  |
//! | removed  | re-create it from the parent commit                        |
//! | renamed  | delete the new path, restore the previous path from parent |
//! | modified | overwrite with the parent content, current hash supplied   |
//!
//! A failing step stops the saga. Steps already committed stay committed;
//! the error lists them so the operator can see how far it got.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, SiteError};
use crate::repo::{ChangedFile, FileStatus, Repository};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevertReport {
    pub reverted: Vec<String>,
    pub commits: Vec<String>,
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(7)]
}

pub async fn revert_commit(repo: &dyn Repository, sha: &str) -> Result<RevertReport> {
    let detail = repo.get_commit(sha).await?;
    let parent = detail
        .parent_sha
        .ok_or_else(|| SiteError::NoParentCommit(sha.to_string()))?;
    if detail.files.is_empty() {
        return Err(SiteError::NoChangedFiles(sha.to_string()));
    }

    let mut report = RevertReport::default();
    for file in &detail.files {
        let message = format!(
            "Revert {} to {} (undo {})",
            file.filename,
            short(&parent),
            short(sha)
        );
        match revert_file(repo, file, &parent, &message).await {
            Ok(commits) => {
                for commit in &commits {
                    info!(sha = %commit, path = %file.filename, "revert step committed");
                }
                report.reverted.push(file.filename.clone());
                report.commits.extend(commits);
            }
            Err(e) => {
                warn!(path = %file.filename, error = %e, "revert step failed");
                return Err(SiteError::PartialRevert {
                    reverted: report.reverted,
                    commits: report.commits,
                    failed_path: file.filename.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

async fn revert_file(
    repo: &dyn Repository,
    file: &ChangedFile,
    parent: &str,
    message: &str,
) -> Result<Vec<String>> {
    let path = file.filename.as_str();
    match file.status {
        FileStatus::Added => Ok(vec![delete_current(repo, path, message).await?]),
        FileStatus::Removed => Ok(vec![restore_from(repo, path, parent, message).await?]),
        FileStatus::Renamed => {
            let mut commits = vec![delete_current(repo, path, message).await?];
            if let Some(previous) = &file.previous_filename {
                commits.push(restore_from(repo, previous, parent, message).await?);
            }
            Ok(commits)
        }
        FileStatus::Modified => Ok(vec![restore_from(repo, path, parent, message).await?]),
    }
}

async fn delete_current(repo: &dyn Repository, path: &str, message: &str) -> Result<String> {
    let current = repo
        .get_file(path, None)
        .await?
        .ok_or_else(|| SiteError::Remote {
            status: 404,
            body: format!("{path} not found at branch head"),
        })?;
    Ok(repo.delete_file(path, message, &current.sha).await?.sha)
}

/// Write the parent commit's version of `path` over whatever is at head.
async fn restore_from(
    repo: &dyn Repository,
    path: &str,
    parent: &str,
    message: &str,
) -> Result<String> {
    let original = repo
        .get_file(path, Some(parent))
        .await?
        .ok_or_else(|| SiteError::Remote {
            status: 404,
            body: format!("{path} not found at {parent}"),
        })?;
    let current_sha = repo.get_file(path, None).await?.map(|f| f.sha);
    let commit = repo
        .put_file(path, &original.content, message, current_sha.as_deref())
        .await?;
    Ok(commit.sha)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
