pub mod commits;
pub mod config;
pub mod content;
pub mod pending;
pub mod serve;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sitebot_core::config::Config;
use sitebot_core::revalidate::{Revalidator, CONTENT_PATHS};
use sitebot_server::{AppState, Components};

/// Configuration from `--config FILE` when given, the environment otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::from_env()),
    }
}

/// The engine as a one-shot command sees it.
///
/// Revalidation is held back from the dispatcher so it can be awaited
/// before the process exits instead of running on a detached task.
pub struct Engine {
    pub state: AppState,
    revalidator: Option<Arc<dyn Revalidator>>,
}

impl Engine {
    pub async fn revalidate(&self) {
        let Some(revalidator) = &self.revalidator else {
            return;
        };
        if let Err(e) = revalidator.revalidate(&CONTENT_PATHS).await {
            tracing::warn!(error = %e, "revalidation failed");
        }
    }
}

/// Run `f` against a freshly wired engine, then drain the snapshot mirror
/// queue so every commit lands before the process exits.
pub fn with_engine<F, Fut, T>(config: Config, f: F) -> anyhow::Result<T>
where
    F: FnOnce(Engine) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let mut components = Components::from_config(&config);
        let revalidator = components.revalidator.take();
        let (state, worker) = AppState::new(config, components);

        let out = f(Engine { state, revalidator }).await;

        if let Some(worker) = worker {
            let report = worker.finish().await;
            if report.failed > 0 {
                tracing::warn!(
                    failed = report.failed,
                    "some snapshot commits could not be written"
                );
            }
        }
        out
    })
}
