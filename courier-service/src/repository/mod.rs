//! Storage interfaces consumed by the core
//!
//! Persistence itself is an external collaborator: the core only talks to the
//! traits in [`traits`]. The in-memory implementation backs the default
//! binary and the test suite.

mod error;
mod memory;
mod traits;

use std::sync::Arc;
use uuid::Uuid;

use crate::model::{Collection, Environment};
use crate::vars::VariableStore;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use memory::InMemoryStore;
pub use traits::{
    CollectionRepository, EnvironmentRepository, FolderRepository, GlobalVariableRepository,
    HistoryRepository, RepositoryResult, RequestRepository, RunRepository,
};

/// All repository handles the core needs, bundled for application state
#[derive(Clone)]
pub struct Repositories {
    pub collections: Arc<dyn CollectionRepository>,
    pub folders: Arc<dyn FolderRepository>,
    pub requests: Arc<dyn RequestRepository>,
    pub environments: Arc<dyn EnvironmentRepository>,
    pub globals: Arc<dyn GlobalVariableRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub runs: Arc<dyn RunRepository>,
}

impl Repositories {
    /// Wire every interface to one shared in-memory store
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            collections: store.clone(),
            folders: store.clone(),
            requests: store.clone(),
            environments: store.clone(),
            globals: store.clone(),
            history: store.clone(),
            runs: store,
        }
    }

    /// Assemble the execution-time variable snapshot for a team
    ///
    /// Globals are read through to the store; collection and environment
    /// variables come from the already-loaded entities.
    pub async fn variable_store(
        &self,
        team_id: Uuid,
        collection: Option<&Collection>,
        environment: Option<&Environment>,
    ) -> RepositoryResult<VariableStore> {
        let globals = self.globals.list_by_team(team_id).await?;
        let collection_vars = collection.map(|c| c.variables.as_slice()).unwrap_or(&[]);
        let environment_vars = environment.map(|e| e.variables.as_slice()).unwrap_or(&[]);
        Ok(VariableStore::assemble(
            &globals,
            collection_vars,
            environment_vars,
        ))
    }
}
