//! Cache invalidation and deploy signalling towards the rendering layer.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::error::{Result, SiteError};

/// Render paths refreshed after every successful mutation.
pub const CONTENT_PATHS: [&str; 2] = ["/", "/events"];

#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self, paths: &[&str]) -> Result<()>;

    /// Ping the deploy hook. `Ok(false)` when none is configured.
    async fn trigger_deploy(&self) -> Result<bool>;

    fn deploys(&self) -> bool;
}

pub struct HttpRevalidator {
    client: Client,
    config: SiteConfig,
}

impl HttpRevalidator {
    pub fn new(config: SiteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

async fn expect_success(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    Err(SiteError::Remote {
        status: status.as_u16(),
        body: resp.text().await.unwrap_or_default(),
    })
}

#[async_trait]
impl Revalidator for HttpRevalidator {
    async fn revalidate(&self, paths: &[&str]) -> Result<()> {
        let url = format!(
            "{}/api/revalidate",
            self.config.base_url.trim_end_matches('/')
        );
        let mut req = self.client.post(url).json(&json!({ "paths": paths }));
        if let Some(secret) = &self.config.revalidate_secret {
            req = req.header("x-revalidate-secret", secret);
        }
        expect_success(req.send().await?).await?;
        debug!(?paths, "revalidated");
        Ok(())
    }

    async fn trigger_deploy(&self) -> Result<bool> {
        let Some(hook) = &self.config.deploy_hook_url else {
            return Ok(false);
        };
        expect_success(self.client.post(hook).send().await?).await?;
        Ok(true)
    }

    fn deploys(&self) -> bool {
        self.config.deploy_hook_url.is_some()
    }
}

/// Fire-and-forget revalidation of [`CONTENT_PATHS`]. Failures are logged.
pub fn spawn_revalidate(revalidator: Arc<dyn Revalidator>) {
    tokio::spawn(async move {
        if let Err(e) = revalidator.revalidate(&CONTENT_PATHS).await {
            warn!(error = %e, "revalidation failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn site(server: &mockito::ServerGuard, hook: Option<String>) -> SiteConfig {
        SiteConfig {
            base_url: server.url(),
            revalidate_secret: Some("s3cret".into()),
            deploy_hook_url: hook,
        }
    }

    #[tokio::test]
    async fn posts_paths_with_secret() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/revalidate")
            .match_header("x-revalidate-secret", "s3cret")
            .match_body(Matcher::Json(json!({ "paths": ["/", "/events"] })))
            .with_status(200)
            .create_async()
            .await;

        let r = HttpRevalidator::new(site(&server, None));
        r.revalidate(&CONTENT_PATHS).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_revalidation_is_remote_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/revalidate")
            .with_status(401)
            .with_body("bad secret")
            .create_async()
            .await;

        let r = HttpRevalidator::new(site(&server, None));
        let err = r.revalidate(&["/"]).await.unwrap_err();
        assert!(matches!(err, SiteError::Remote { status: 401, .. }));
    }

    #[tokio::test]
    async fn deploy_hook_is_optional() {
        let mut server = mockito::Server::new_async().await;
        let r = HttpRevalidator::new(site(&server, None));
        assert!(!r.deploys());
        assert!(!r.trigger_deploy().await.unwrap());

        let mock = server
            .mock("POST", "/hooks/deploy")
            .with_status(201)
            .create_async()
            .await;
        let r = HttpRevalidator::new(site(&server, Some(format!("{}/hooks/deploy", server.url()))));
        assert!(r.trigger_deploy().await.unwrap());
        mock.assert_async().await;
    }
}
