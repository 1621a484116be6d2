//! In-memory repository implementation
//!
//! Backs the default binary and the test suite. Every map lives behind its
//! own `RwLock`; no lock is held across an await point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
use super::traits::{
    CollectionRepository, EnvironmentRepository, FolderRepository, GlobalVariableRepository,
    HistoryRepository, RepositoryResult, RequestRepository, RunRepository,
};
use crate::model::{
    Collection, Environment, Folder, GlobalVariable, HistoryFilter, RequestDefinition,
    RequestHistory, RunIteration, RunResult, RunStatus,
};
use crate::pagination::PageParams;

/// All entity maps in one store, shared behind an `Arc` by the application
/// state
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<Uuid, Collection>>,
    folders: RwLock<HashMap<Uuid, Folder>>,
    requests: RwLock<HashMap<Uuid, RequestDefinition>>,
    environments: RwLock<HashMap<Uuid, Environment>>,
    globals: RwLock<HashMap<(Uuid, String), GlobalVariable>>,
    history: RwLock<Vec<RequestHistory>>,
    runs: RwLock<HashMap<Uuid, RunResult>>,
    iterations: RwLock<Vec<RunIteration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned(operation: RepositoryOperation) -> RepositoryError {
        RepositoryError::new(operation, RepositoryErrorKind::Other, "store lock poisoned")
    }

    /// Ids of `folder_id` and every folder below it
    fn descendant_folder_ids(folders: &HashMap<Uuid, Folder>, folder_id: Uuid) -> Vec<Uuid> {
        let mut ids = vec![folder_id];
        let mut frontier = vec![folder_id];
        while let Some(parent) = frontier.pop() {
            for folder in folders.values() {
                if folder.parent_folder_id == Some(parent) {
                    ids.push(folder.id);
                    frontier.push(folder.id);
                }
            }
        }
        ids
    }
}

#[async_trait]
impl CollectionRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Collection>> {
        let map = self
            .collections
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindById))?;
        Ok(map.get(&id).cloned())
    }

    async fn list_by_team(&self, team_id: Uuid) -> RepositoryResult<Vec<Collection>> {
        let map = self
            .collections
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<Collection> = map
            .values()
            .filter(|c| c.team_id == team_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn save(&self, collection: Collection) -> RepositoryResult<Collection> {
        let mut map = self
            .collections
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Create))?;
        let duplicate = map.values().any(|c| {
            c.team_id == collection.team_id && c.name == collection.name && c.id != collection.id
        });
        if duplicate {
            return Err(RepositoryError::already_exists(
                "Collection",
                &collection.name,
            ));
        }
        map.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        if collections.remove(&id).is_none() {
            return Ok(false);
        }

        // Cascade to folders and their requests
        let mut folders = self
            .folders
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        let removed: Vec<Uuid> = folders
            .values()
            .filter(|f| f.collection_id == id)
            .map(|f| f.id)
            .collect();
        folders.retain(|_, f| f.collection_id != id);

        let mut requests = self
            .requests
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        requests.retain(|_, r| !removed.contains(&r.folder_id));

        Ok(true)
    }
}

#[async_trait]
impl FolderRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Folder>> {
        let map = self
            .folders
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindById))?;
        Ok(map.get(&id).cloned())
    }

    async fn list_by_collection(&self, collection_id: Uuid) -> RepositoryResult<Vec<Folder>> {
        let map = self
            .folders
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<Folder> = map
            .values()
            .filter(|f| f.collection_id == collection_id)
            .cloned()
            .collect();
        result.sort_by_key(|f| (f.sort_order, f.created_at));
        Ok(result)
    }

    async fn find_root_folders(&self, collection_id: Uuid) -> RepositoryResult<Vec<Folder>> {
        let map = self
            .folders
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<Folder> = map
            .values()
            .filter(|f| f.collection_id == collection_id && f.parent_folder_id.is_none())
            .cloned()
            .collect();
        result.sort_by_key(|f| (f.sort_order, f.created_at));
        Ok(result)
    }

    async fn save(&self, folder: Folder) -> RepositoryResult<Folder> {
        let mut map = self
            .folders
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Create))?;
        map.insert(folder.id, folder.clone());
        Ok(folder)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut folders = self
            .folders
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        if !folders.contains_key(&id) {
            return Ok(false);
        }
        let removed = Self::descendant_folder_ids(&folders, id);
        folders.retain(|fid, _| !removed.contains(fid));

        let mut requests = self
            .requests
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        requests.retain(|_, r| !removed.contains(&r.folder_id));

        Ok(true)
    }
}

#[async_trait]
impl RequestRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<RequestDefinition>> {
        let map = self
            .requests
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindById))?;
        Ok(map.get(&id).cloned())
    }

    async fn list_by_folder(&self, folder_id: Uuid) -> RepositoryResult<Vec<RequestDefinition>> {
        let map = self
            .requests
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<RequestDefinition> = map
            .values()
            .filter(|r| r.folder_id == folder_id)
            .cloned()
            .collect();
        result.sort_by_key(|r| (r.sort_order, r.created_at));
        Ok(result)
    }

    async fn save(&self, request: RequestDefinition) -> RepositoryResult<RequestDefinition> {
        let mut map = self
            .requests
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Create))?;
        map.insert(request.id, request.clone());
        Ok(request)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut map = self
            .requests
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        Ok(map.remove(&id).is_some())
    }
}

#[async_trait]
impl EnvironmentRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Environment>> {
        let map = self
            .environments
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindById))?;
        Ok(map.get(&id).cloned())
    }

    async fn list_by_team(&self, team_id: Uuid) -> RepositoryResult<Vec<Environment>> {
        let map = self
            .environments
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<Environment> = map
            .values()
            .filter(|e| e.team_id == team_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn find_active(&self, team_id: Uuid) -> RepositoryResult<Option<Environment>> {
        let map = self
            .environments
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        Ok(map
            .values()
            .find(|e| e.team_id == team_id && e.is_active)
            .cloned())
    }

    async fn save(&self, environment: Environment) -> RepositoryResult<Environment> {
        let mut map = self
            .environments
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Create))?;
        map.insert(environment.id, environment.clone());
        Ok(environment)
    }

    async fn activate(
        &self,
        team_id: Uuid,
        environment_id: Uuid,
    ) -> RepositoryResult<Environment> {
        // One write guard covers the whole swap, so no reader can observe two
        // active environments for the team.
        let mut map = self
            .environments
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Activate))?;

        match map.get(&environment_id) {
            Some(e) if e.team_id == team_id => {}
            _ => return Err(RepositoryError::not_found("Environment", environment_id)),
        }

        for env in map.values_mut() {
            if env.team_id == team_id {
                env.is_active = env.id == environment_id;
            }
        }

        Ok(map
            .get(&environment_id)
            .cloned()
            .expect("environment checked above"))
    }
}

#[async_trait]
impl GlobalVariableRepository for InMemoryStore {
    async fn list_by_team(&self, team_id: Uuid) -> RepositoryResult<Vec<GlobalVariable>> {
        let map = self
            .globals
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<GlobalVariable> = map
            .values()
            .filter(|g| g.team_id == team_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    async fn upsert(
        &self,
        team_id: Uuid,
        key: &str,
        value: &str,
        is_secret: bool,
        is_enabled: bool,
    ) -> RepositoryResult<GlobalVariable> {
        let mut map = self
            .globals
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Create))?;
        let entry = map
            .entry((team_id, key.to_string()))
            .or_insert_with(|| GlobalVariable {
                id: Uuid::new_v4(),
                team_id,
                key: key.to_string(),
                value: String::new(),
                is_secret: false,
                is_enabled: true,
                created_at: Utc::now(),
            });
        entry.value = value.to_string();
        entry.is_secret = is_secret;
        entry.is_enabled = is_enabled;
        Ok(entry.clone())
    }

    async fn delete(&self, team_id: Uuid, key: &str) -> RepositoryResult<bool> {
        let mut map = self
            .globals
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        Ok(map.remove(&(team_id, key.to_string())).is_some())
    }
}

#[async_trait]
impl HistoryRepository for InMemoryStore {
    async fn append(&self, entry: RequestHistory) -> RepositoryResult<Uuid> {
        let mut log = self
            .history
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Append))?;
        let id = entry.id;
        // Replays with a known id overwrite in place instead of duplicating
        if let Some(existing) = log.iter_mut().find(|e| e.id == id) {
            *existing = entry;
        } else {
            log.push(entry);
        }
        Ok(id)
    }

    async fn list_by_team(
        &self,
        team_id: Uuid,
        filter: &HistoryFilter,
        page: PageParams,
    ) -> RepositoryResult<(Vec<RequestHistory>, u64)> {
        let log = self
            .history
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut matching: Vec<RequestHistory> = log
            .iter()
            .filter(|e| e.team_id == team_id && filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        Ok((page.slice(&matching), total))
    }

    async fn prune_older_than(
        &self,
        team_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let mut log = self
            .history
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Delete))?;
        let before = log.len();
        log.retain(|e| e.team_id != team_id || e.created_at >= cutoff);
        Ok((before - log.len()) as u64)
    }
}

#[async_trait]
impl RunRepository for InMemoryStore {
    async fn create(&self, run: RunResult) -> RepositoryResult<RunResult> {
        let mut map = self
            .runs
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Create))?;
        map.insert(run.id, run.clone());
        Ok(run)
    }

    async fn update(&self, run: RunResult) -> RepositoryResult<RunResult> {
        let mut map = self
            .runs
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Update))?;
        if !map.contains_key(&run.id) {
            return Err(RepositoryError::not_found("Run", run.id));
        }
        map.insert(run.id, run.clone());
        Ok(run)
    }

    async fn append_iteration(&self, iteration: RunIteration) -> RepositoryResult<()> {
        let mut log = self
            .iterations
            .write()
            .map_err(|_| Self::poisoned(RepositoryOperation::Append))?;
        log.push(iteration);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<RunResult>> {
        let map = self
            .runs
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindById))?;
        Ok(map.get(&id).cloned())
    }

    async fn list_by_team(
        &self,
        team_id: Uuid,
        page: PageParams,
    ) -> RepositoryResult<(Vec<RunResult>, u64)> {
        let map = self
            .runs
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let mut result: Vec<RunResult> = map
            .values()
            .filter(|r| r.team_id == team_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = result.len() as u64;
        Ok((page.slice(&result), total))
    }

    async fn list_iterations(
        &self,
        run_id: Uuid,
        page: PageParams,
    ) -> RepositoryResult<(Vec<RunIteration>, u64)> {
        let log = self
            .iterations
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        let matching: Vec<RunIteration> = log
            .iter()
            .filter(|i| i.run_id == run_id)
            .cloned()
            .collect();
        let total = matching.len() as u64;
        Ok((page.slice(&matching), total))
    }

    async fn find_running_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<RunResult>> {
        let map = self
            .runs
            .read()
            .map_err(|_| Self::poisoned(RepositoryOperation::FindAll))?;
        Ok(map
            .values()
            .filter(|r| {
                r.status == RunStatus::Running
                    && r.started_at.map(|s| s < cutoff).unwrap_or(true)
            })
            .cloned()
            .collect())
    }
}
