//! GitHub REST implementation of [`Repository`].
//!
//! Uses the contents API for file reads and writes (base64 bodies) and the
//! commits API for history and per-commit file lists.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{ChangedFile, CommitDetail, CommitRef, CommitSummary, RepoFile, Repository};
use crate::config::RepoConfig;
use crate::error::{Result, SiteError};

pub struct GitHubRepository {
    client: Client,
    config: RepoConfig,
}

impl GitHubRepository {
    pub fn new(config: RepoConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            rest
        )
    }

    fn request(&self, method: reqwest::Method, rest: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(rest))
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "sitebot")
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    commit: ShaOnly,
}

#[derive(Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitBody,
    #[serde(default)]
    parents: Vec<ShaOnly>,
    #[serde(default)]
    files: Option<Vec<ChangedFile>>,
}

#[derive(Deserialize)]
struct CommitBody {
    message: String,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SiteError::Remote {
        status: status.as_u16(),
        body,
    })
}

fn decode_content(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| SiteError::Remote {
        status: 200,
        body: format!("invalid base64 file content: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Repository impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Repository for GitHubRepository {
    async fn get_file(&self, path: &str, git_ref: Option<&str>) -> Result<Option<RepoFile>> {
        let git_ref = git_ref.unwrap_or(&self.config.branch);
        let resp = self
            .request(reqwest::Method::GET, &format!("contents/{path}"))
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ContentsResponse = check(resp).await?.json().await?;
        Ok(Some(RepoFile {
            path: path.to_string(),
            sha: body.sha,
            content: decode_content(&body.content)?,
        }))
    }

    async fn put_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        prior_sha: Option<&str>,
    ) -> Result<CommitRef> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": self.config.branch,
        });
        if let Some(sha) = prior_sha {
            body["sha"] = json!(sha);
        }
        let resp = self
            .request(reqwest::Method::PUT, &format!("contents/{path}"))
            .json(&body)
            .send()
            .await?;
        let written: WriteResponse = check(resp).await?.json().await?;
        Ok(CommitRef {
            sha: written.commit.sha,
        })
    }

    async fn delete_file(&self, path: &str, message: &str, sha: &str) -> Result<CommitRef> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("contents/{path}"))
            .json(&json!({
                "message": message,
                "sha": sha,
                "branch": self.config.branch,
            }))
            .send()
            .await?;
        let written: WriteResponse = check(resp).await?.json().await?;
        Ok(CommitRef {
            sha: written.commit.sha,
        })
    }

    async fn list_commits(&self, path: Option<&str>, limit: usize) -> Result<Vec<CommitSummary>> {
        let mut params = vec![
            ("sha".to_string(), self.config.branch.clone()),
            ("per_page".to_string(), limit.clamp(1, 100).to_string()),
        ];
        if let Some(path) = path {
            params.push(("path".to_string(), path.to_string()));
        }
        let resp = self
            .request(reqwest::Method::GET, "commits")
            .query(&params)
            .send()
            .await?;
        let commits: Vec<CommitResponse> = check(resp).await?.json().await?;
        Ok(commits
            .into_iter()
            .map(|c| {
                let (author, date) = match c.commit.author {
                    Some(a) => (a.name, a.date),
                    None => (None, None),
                };
                CommitSummary {
                    sha: c.sha,
                    message: c.commit.message,
                    author,
                    date,
                }
            })
            .collect())
    }

    async fn get_commit(&self, sha: &str) -> Result<CommitDetail> {
        let resp = self
            .request(reqwest::Method::GET, &format!("commits/{sha}"))
            .send()
            .await?;
        let c: CommitResponse = check(resp).await?.json().await?;
        Ok(CommitDetail {
            sha: c.sha,
            message: c.commit.message,
            parent_sha: c.parents.into_iter().next().map(|p| p.sha),
            files: c.files.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::FileStatus;
    use mockito::Matcher;

    fn repo_for(server: &mockito::ServerGuard) -> GitHubRepository {
        GitHubRepository::new(RepoConfig {
            owner: "org".into(),
            repo: "site".into(),
            branch: "main".into(),
            token: "tok".into(),
            api_base: server.url(),
        })
    }

    #[tokio::test]
    async fn get_file_decodes_wrapped_base64() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/org/site/contents/content/stats.json")
            .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"sha": "abc", "content": "aGVs\nbG8=\n", "encoding": "base64"}"#)
            .create_async()
            .await;

        let repo = repo_for(&server);
        let file = repo
            .get_file("content/stats.json", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.sha, "abc");
        assert_eq!(file.content, b"hello");
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/org/site/contents/nope.json")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let repo = repo_for(&server);
        assert!(repo.get_file("nope.json", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_file_sends_prior_sha() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/repos/org/site/contents/content/stats.json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "message": "m",
                "content": "aGk=",
                "branch": "main",
                "sha": "old",
            })))
            .with_status(200)
            .with_body(r#"{"content": {}, "commit": {"sha": "new"}}"#)
            .create_async()
            .await;

        let repo = repo_for(&server);
        let commit = repo
            .put_file("content/stats.json", b"hi", "m", Some("old"))
            .await
            .unwrap();
        assert_eq!(commit.sha, "new");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_commit_reads_parent_and_files() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/org/site/commits/c2")
            .with_status(200)
            .with_body(
                r#"{
                    "sha": "c2",
                    "commit": {"message": "edit"},
                    "parents": [{"sha": "c1"}],
                    "files": [
                        {"filename": "a.json", "status": "modified"},
                        {"filename": "b.json", "status": "removed"}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let repo = repo_for(&server);
        let detail = repo.get_commit("c2").await.unwrap();
        assert_eq!(detail.parent_sha.as_deref(), Some("c1"));
        assert_eq!(detail.files.len(), 2);
        assert_eq!(detail.files[1].status, FileStatus::Removed);
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/repos/org/site/contents/a.json")
            .with_status(409)
            .with_body("sha mismatch")
            .create_async()
            .await;

        let repo = repo_for(&server);
        let err = repo.delete_file("a.json", "m", "stale").await.unwrap_err();
        match err {
            SiteError::Remote { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body, "sha mismatch");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_commits_maps_author() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/org/site/commits")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("sha".into(), "main".into()),
                Matcher::UrlEncoded("per_page".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"sha": "c9", "commit": {"message": "m",
                    "author": {"name": "bot", "date": "2026-01-01T00:00:00Z"}}}]"#,
            )
            .create_async()
            .await;

        let repo = repo_for(&server);
        let commits = repo.list_commits(None, 5).await.unwrap();
        assert_eq!(commits[0].sha, "c9");
        assert_eq!(commits[0].author.as_deref(), Some("bot"));
    }
}
