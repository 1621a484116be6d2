//! Application state shared across handlers

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::proxy::{HistoryRecorder, ProxyExecutor};
use crate::repository::Repositories;
use crate::runner::{CollectionRunner, RunRegistry};
use crate::script::Sandbox;

/// Everything a handler needs, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub executor: Arc<ProxyExecutor>,
    pub runner: Arc<CollectionRunner>,
    pub registry: Arc<RunRegistry>,
    pub sandbox: Arc<Sandbox>,
}

impl AppState {
    /// State backed by the in-memory store (default binary and tests)
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_repositories(config, Repositories::in_memory())
    }

    /// State over caller-supplied repository implementations
    pub fn with_repositories(config: Config, repos: Repositories) -> Result<Self> {
        let recorder = HistoryRecorder::new(repos.history.clone(), &config.history);
        let executor = Arc::new(ProxyExecutor::new(config.proxy.clone(), recorder)?);
        let sandbox = Arc::new(Sandbox::new(config.script.clone()));
        let registry = Arc::new(RunRegistry::new());
        let runner = Arc::new(CollectionRunner::new(
            repos.clone(),
            executor.clone(),
            sandbox.clone(),
            registry.clone(),
            config.runner.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            repos,
            executor,
            runner,
            registry,
            sandbox,
        })
    }
}
