use std::sync::Arc;
use std::time::Duration;

use sitebot_core::config::Config;
use sitebot_core::dispatch::Dispatcher;
use sitebot_core::interpreter::{HttpInterpreter, HttpTranscriber, Interpreter, Transcriber};
use sitebot_core::mirror::{spawn_outbox, MirrorWorker, SnapshotMirror};
use sitebot_core::pending::PendingActions;
use sitebot_core::repo::{GitHubRepository, Repository};
use sitebot_core::revalidate::{HttpRevalidator, Revalidator};
use sitebot_core::store::{RestStore, Store};
use sitebot_core::{Result, SiteError};

use crate::telegram::{Messenger, TelegramMessenger};

/// The external collaborators a server is wired with. Any of them may be
/// absent; the routes that need a missing one degrade to "not configured".
#[derive(Default, Clone)]
pub struct Components {
    pub store: Option<Arc<dyn Store>>,
    pub repo: Option<Arc<dyn Repository>>,
    pub messenger: Option<Arc<dyn Messenger>>,
    pub interpreter: Option<Arc<dyn Interpreter>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub revalidator: Option<Arc<dyn Revalidator>>,
}

impl Components {
    /// HTTP clients for every integration present in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: config
                .store
                .as_ref()
                .map(|c| Arc::new(RestStore::new(c)) as Arc<dyn Store>),
            repo: config
                .repo
                .clone()
                .map(|c| Arc::new(GitHubRepository::new(c)) as Arc<dyn Repository>),
            messenger: config
                .bot
                .clone()
                .map(|c| Arc::new(TelegramMessenger::new(c)) as Arc<dyn Messenger>),
            interpreter: config
                .interpreter
                .clone()
                .map(|c| Arc::new(HttpInterpreter::new(c)) as Arc<dyn Interpreter>),
            transcriber: config
                .transcriber
                .clone()
                .map(|c| Arc::new(HttpTranscriber::new(c)) as Arc<dyn Transcriber>),
            revalidator: config
                .site
                .clone()
                .map(|c| Arc::new(HttpRevalidator::new(c)) as Arc<dyn Revalidator>),
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Option<Arc<Dispatcher>>,
    pub pending: Option<Arc<PendingActions>>,
    pub repo: Option<Arc<dyn Repository>>,
    pub messenger: Option<Arc<dyn Messenger>>,
    pub interpreter: Option<Arc<dyn Interpreter>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl AppState {
    /// Wire the engine from `components`.
    ///
    /// With both a store and a repository present the snapshot mirror worker
    /// is started; its handle is returned so the caller can drain it on
    /// shutdown. Must run inside a Tokio runtime.
    pub fn new(config: Config, components: Components) -> (Self, Option<MirrorWorker>) {
        let Components {
            store,
            repo,
            messenger,
            interpreter,
            transcriber,
            revalidator,
        } = components;

        let mut worker = None;
        let (dispatcher, pending) = match store {
            Some(store) => {
                let mut dispatcher =
                    Dispatcher::new(store.clone(), config.engine.history_retention);
                if let Some(repo) = &repo {
                    let mirror = Arc::new(SnapshotMirror::new(store.clone(), repo.clone()));
                    let (outbox, handle) = spawn_outbox(mirror, config.engine.mirror_retries);
                    dispatcher = dispatcher.with_outbox(outbox);
                    worker = Some(handle);
                }
                if let Some(revalidator) = revalidator {
                    dispatcher = dispatcher.with_revalidator(revalidator);
                }
                (
                    Some(Arc::new(dispatcher)),
                    Some(Arc::new(PendingActions::new(store))),
                )
            }
            None => (None, None),
        };

        let state = Self {
            config: Arc::new(config),
            dispatcher,
            pending,
            repo,
            messenger,
            interpreter,
            transcriber,
        };
        (state, worker)
    }

    pub fn from_config(config: Config) -> (Self, Option<MirrorWorker>) {
        let components = Components::from_config(&config);
        Self::new(config, components)
    }

    pub fn dispatcher(&self) -> Result<&Arc<Dispatcher>> {
        self.dispatcher.as_ref().ok_or(SiteError::StoreUnavailable)
    }

    pub fn pending(&self) -> Result<&Arc<PendingActions>> {
        self.pending.as_ref().ok_or(SiteError::StoreUnavailable)
    }

    pub fn repo(&self) -> Result<&Arc<dyn Repository>> {
        self.repo.as_ref().ok_or(SiteError::NotConfigured("repository"))
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.config.engine.pending_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitebot_core::repo::MemoryRepository;
    use sitebot_core::store::MemoryStore;

    #[tokio::test]
    async fn no_store_means_store_unavailable() {
        let (state, worker) = AppState::new(Config::default(), Components::default());
        assert!(worker.is_none());
        assert!(matches!(
            state.dispatcher().err(),
            Some(SiteError::StoreUnavailable)
        ));
        assert!(state.repo().is_err());
    }

    #[tokio::test]
    async fn store_and_repo_start_the_mirror_worker() {
        let components = Components {
            store: Some(Arc::new(MemoryStore::new())),
            repo: Some(Arc::new(MemoryRepository::new())),
            ..Components::default()
        };
        let (state, worker) = AppState::new(Config::default(), components);
        assert!(state.dispatcher().is_ok());
        assert!(state.pending().is_ok());
        drop(state);
        let report = worker.unwrap().finish().await;
        assert_eq!(report.committed, 0);
    }
}
