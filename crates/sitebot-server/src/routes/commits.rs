use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use sitebot_core::repo::CommitSummary;
use sitebot_core::revert::{revert_commit, RevertReport};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommitsQuery {
    pub path: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/commits: newest commits on the mirror branch.
pub async fn list(
    State(app): State<AppState>,
    Query(query): Query<CommitsQuery>,
) -> Result<Json<Vec<CommitSummary>>, AppError> {
    let commits = app
        .repo()?
        .list_commits(query.path.as_deref(), query.limit.unwrap_or(10))
        .await?;
    Ok(Json(commits))
}

/// POST /api/commits/{sha}/revert: invert every file change of one commit,
/// one new commit per file.
pub async fn revert(
    State(app): State<AppState>,
    Path(sha): Path<String>,
) -> Result<Json<RevertReport>, AppError> {
    let report = revert_commit(app.repo()?.as_ref(), &sha).await?;
    Ok(Json(report))
}
