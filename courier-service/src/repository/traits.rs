//! Repository trait definitions
//!
//! The core consumes these narrow interfaces and never talks to storage
//! directly. Traits are object-safe (`#[async_trait]`) so application state
//! can hold them as `Arc<dyn …>` and tests can substitute fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::RepositoryError;
use crate::model::{
    Collection, Environment, Folder, GlobalVariable, HistoryFilter, RequestDefinition,
    RequestHistory, RunIteration, RunResult,
};
use crate::pagination::PageParams;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Storage interface for collections
///
/// Deleting a collection cascades to its folders and requests.
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Collection>>;

    async fn list_by_team(&self, team_id: Uuid) -> RepositoryResult<Vec<Collection>>;

    /// Insert or replace; enforces the `(team_id, name)` uniqueness rule
    async fn save(&self, collection: Collection) -> RepositoryResult<Collection>;

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Storage interface for folders
#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Folder>>;

    async fn list_by_collection(&self, collection_id: Uuid) -> RepositoryResult<Vec<Folder>>;

    /// Folders with no parent, in `(sort_order, created_at)` order
    async fn find_root_folders(&self, collection_id: Uuid) -> RepositoryResult<Vec<Folder>>;

    async fn save(&self, folder: Folder) -> RepositoryResult<Folder>;

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Storage interface for stored requests
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<RequestDefinition>>;

    /// Requests in the folder, in `(sort_order, created_at)` order
    async fn list_by_folder(&self, folder_id: Uuid) -> RepositoryResult<Vec<RequestDefinition>>;

    async fn save(&self, request: RequestDefinition) -> RepositoryResult<RequestDefinition>;

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Storage interface for environments
#[async_trait]
pub trait EnvironmentRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Environment>>;

    async fn list_by_team(&self, team_id: Uuid) -> RepositoryResult<Vec<Environment>>;

    async fn find_active(&self, team_id: Uuid) -> RepositoryResult<Option<Environment>>;

    async fn save(&self, environment: Environment) -> RepositoryResult<Environment>;

    /// Atomically deactivate the team's current active environment and
    /// activate the given one, preserving the at-most-one-active invariant
    async fn activate(&self, team_id: Uuid, environment_id: Uuid)
        -> RepositoryResult<Environment>;
}

/// Storage interface for team-wide variables
#[async_trait]
pub trait GlobalVariableRepository: Send + Sync {
    async fn list_by_team(&self, team_id: Uuid) -> RepositoryResult<Vec<GlobalVariable>>;

    /// Insert or replace by `(team_id, key)`
    async fn upsert(
        &self,
        team_id: Uuid,
        key: &str,
        value: &str,
        is_secret: bool,
        is_enabled: bool,
    ) -> RepositoryResult<GlobalVariable>;

    async fn delete(&self, team_id: Uuid, key: &str) -> RepositoryResult<bool>;
}

/// Storage interface for the request history log
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Append an entry; replays with the same id overwrite in place
    async fn append(&self, entry: RequestHistory) -> RepositoryResult<Uuid>;

    /// Newest-first page of entries plus the total matching the filter
    async fn list_by_team(
        &self,
        team_id: Uuid,
        filter: &HistoryFilter,
        page: PageParams,
    ) -> RepositoryResult<(Vec<RequestHistory>, u64)>;

    /// Delete entries created before the cutoff; returns the removed count
    async fn prune_older_than(&self, team_id: Uuid, cutoff: DateTime<Utc>)
        -> RepositoryResult<u64>;
}

/// Storage interface for collection runs
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: RunResult) -> RepositoryResult<RunResult>;

    async fn update(&self, run: RunResult) -> RepositoryResult<RunResult>;

    async fn append_iteration(&self, iteration: RunIteration) -> RepositoryResult<()>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<RunResult>>;

    /// Newest-first page of the team's runs plus the total count
    async fn list_by_team(
        &self,
        team_id: Uuid,
        page: PageParams,
    ) -> RepositoryResult<(Vec<RunResult>, u64)>;

    /// Iterations of a run in append order plus the total count
    async fn list_iterations(
        &self,
        run_id: Uuid,
        page: PageParams,
    ) -> RepositoryResult<(Vec<RunIteration>, u64)>;

    /// RUNNING runs whose start predates the cutoff, for the orphan sweep
    async fn find_running_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<RunResult>>;
}
