//! Collection runner
//!
//! Drives every request of a collection across N iterations: seeds the local
//! scope from the data file, runs the script chains around each dispatch,
//! aggregates assertion counts, persists one `RunIteration` per request, and
//! honours cancellation at the per-request checkpoint.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::data::DataSet;
use super::registry::RunRegistry;
use crate::auth::AuthResolver;
use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::identity::CallerIdentity;
use crate::model::{
    Collection, EffectiveAuth, Environment, Folder, KeyValueEntry, RequestDefinition,
    RunIteration, RunResult, RunStatus, ScriptType,
};
use crate::pagination::{Page, PageParams};
use crate::proxy::{OutboundRequest, ProxyExecutor};
use crate::repository::Repositories;
use crate::script::{
    request_passed, summarize, AssertionResult, Sandbox, ScriptPhase, ScriptRequestView,
    ScriptResponseView,
};
use crate::vars::{expand, VariableStore};

fn default_iteration_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// `POST /runner/start` request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub collection_id: Uuid,

    /// Environment to resolve against; the team's active environment when
    /// omitted
    #[serde(default)]
    pub environment_id: Option<Uuid>,

    #[serde(default = "default_iteration_count")]
    pub iteration_count: u32,

    #[serde(default)]
    pub delay_between_requests_ms: u64,

    #[serde(default)]
    pub data_filename: Option<String>,

    #[serde(default)]
    pub data_content: Option<String>,

    #[serde(default = "default_true")]
    pub save_to_history: bool,
}

/// One flattened request with everything resolved up front
struct PlannedRequest {
    request: RequestDefinition,
    /// Outermost to innermost
    folder_chain: Vec<Folder>,
    auth: EffectiveAuth,
}

/// What one request execution produced, for aggregation and the iteration
/// record
struct RequestOutcome {
    url: String,
    status_code: u16,
    response_size_bytes: u64,
    response_time_ms: u64,
    assertions: Vec<AssertionResult>,
    passed: bool,
    error: Option<String>,
}

struct RunContext {
    run: RunResult,
    collection: Collection,
    environment: Option<Environment>,
    dataset: Option<DataSet>,
    plan: Vec<PlannedRequest>,
    identity: CallerIdentity,
    save_to_history: bool,
}

/// Orchestrates collection runs
#[derive(Clone)]
pub struct CollectionRunner {
    repos: Repositories,
    executor: Arc<ProxyExecutor>,
    sandbox: Arc<Sandbox>,
    registry: Arc<RunRegistry>,
    config: RunnerConfig,
}

impl CollectionRunner {
    pub fn new(
        repos: Repositories,
        executor: Arc<ProxyExecutor>,
        sandbox: Arc<Sandbox>,
        registry: Arc<RunRegistry>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            repos,
            executor,
            sandbox,
            registry,
            config,
        }
    }

    /// Validate, persist the PENDING run, and spawn the driver task
    pub async fn start(
        &self,
        request: StartRunRequest,
        identity: CallerIdentity,
    ) -> Result<RunResult> {
        if request.iteration_count < 1 || request.iteration_count > self.config.max_iterations {
            return Err(Error::Validation(format!(
                "iterationCount must be between 1 and {}",
                self.config.max_iterations
            )));
        }
        if request.delay_between_requests_ms > self.config.max_delay_ms {
            return Err(Error::Validation(format!(
                "delayBetweenRequestsMs must be between 0 and {}",
                self.config.max_delay_ms
            )));
        }

        let collection = self
            .repos
            .collections
            .get(request.collection_id)
            .await?
            .ok_or_else(|| Error::not_found("Collection", request.collection_id))?;
        identity.assert_team(collection.team_id)?;

        let environment = match request.environment_id {
            Some(id) => {
                let environment = self
                    .repos
                    .environments
                    .get(id)
                    .await?
                    .ok_or_else(|| Error::not_found("Environment", id))?;
                identity.assert_team(environment.team_id)?;
                Some(environment)
            }
            None => self.repos.environments.find_active(identity.team_id).await?,
        };

        let dataset = match &request.data_content {
            Some(content) => Some(DataSet::parse(request.data_filename.as_deref(), content)?),
            None => None,
        };

        let plan = self.flatten(&collection).await?;
        if plan.is_empty() {
            return Err(Error::Validation(
                "collection has no requests to run".to_string(),
            ));
        }

        let run = RunResult::pending(
            identity.team_id,
            collection.id,
            environment.as_ref().map(|e| e.id),
            request.iteration_count,
            request.delay_between_requests_ms,
            request.data_filename.clone(),
            identity.user_id,
        );
        let run = self.repos.runs.create(run).await?;
        let cancel = self.registry.register(run.id);

        tracing::info!(
            run_id = %run.id,
            collection = %collection.name,
            iterations = request.iteration_count,
            requests = plan.len(),
            "collection run accepted"
        );

        let runner = self.clone();
        let context = RunContext {
            run: run.clone(),
            collection,
            environment,
            dataset,
            plan,
            identity,
            save_to_history: request.save_to_history,
        };
        tokio::spawn(async move {
            runner.drive(context, cancel).await;
        });

        Ok(run)
    }

    /// Current persisted state of a run
    pub async fn get(&self, run_id: Uuid, identity: &CallerIdentity) -> Result<RunResult> {
        let run = self
            .repos
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| Error::not_found("Run", run_id))?;
        identity.assert_team(run.team_id)?;
        Ok(run)
    }

    /// Newest-first page of the team's runs
    pub async fn list(
        &self,
        identity: &CallerIdentity,
        page: PageParams,
    ) -> Result<Page<RunResult>> {
        let (items, total) = self.repos.runs.list_by_team(identity.team_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Recorded iterations of a run, in append order
    pub async fn iterations(
        &self,
        run_id: Uuid,
        identity: &CallerIdentity,
        page: PageParams,
    ) -> Result<Page<RunIteration>> {
        // Team check rides on the run lookup
        self.get(run_id, identity).await?;
        let (items, total) = self.repos.runs.list_iterations(run_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Flip the cancel flag; the driver observes it between requests
    pub async fn cancel(&self, run_id: Uuid, identity: &CallerIdentity) -> Result<RunResult> {
        let run = self.get(run_id, identity).await?;
        if !run.status.is_terminal() {
            self.registry.cancel(run_id);
        }
        Ok(run)
    }

    /// Mark RUNNING runs abandoned by a crash as FAILED
    ///
    /// Called on startup; anything persisted as RUNNING with no live registry
    /// entry and a start older than the threshold cannot still be executing.
    pub async fn sweep_orphans(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.orphan_threshold_secs as i64);
        let stale = self.repos.runs.find_running_older_than(cutoff).await?;
        let mut swept = 0;
        for mut run in stale {
            if self.registry.status(run.id).is_some() {
                continue;
            }
            run.status = RunStatus::Failed;
            run.orphaned = true;
            run.error = Some("orphaned: no live runner after restart".to_string());
            run.completed_at = Some(Utc::now());
            self.repos.runs.update(run.clone()).await?;
            tracing::warn!(run_id = %run.id, "marked orphaned run as failed");
            swept += 1;
        }
        Ok(swept)
    }

    /// Depth-first flatten of the collection tree with auth pre-resolved
    ///
    /// Folders depth-first in `(sort_order, created_at)` order, requests
    /// within each folder by the same rule.
    async fn flatten(&self, collection: &Collection) -> Result<Vec<PlannedRequest>> {
        let all = self.repos.folders.list_by_collection(collection.id).await?;

        let mut plan: Vec<PlannedRequest> = Vec::new();
        let resolver = AuthResolver::new(self.repos.folders.as_ref());

        // Explicit stack seeded with roots in reverse so pop order matches
        // the repository ordering
        let roots: Vec<Folder> = all
            .iter()
            .filter(|f| f.parent_folder_id.is_none())
            .cloned()
            .collect();
        let mut stack: Vec<(Folder, Vec<Folder>)> =
            roots.into_iter().rev().map(|f| (f, Vec::new())).collect();

        while let Some((folder, chain)) = stack.pop() {
            let mut folder_chain = chain.clone();
            folder_chain.push(folder.clone());

            for request in self.repos.requests.list_by_folder(folder.id).await? {
                let auth = resolver.resolve(&request, collection).await?;
                plan.push(PlannedRequest {
                    request,
                    folder_chain: folder_chain.clone(),
                    auth,
                });
            }

            let children: Vec<Folder> = all
                .iter()
                .filter(|f| f.parent_folder_id == Some(folder.id))
                .cloned()
                .collect();
            for child in children.into_iter().rev() {
                stack.push((child, folder_chain.clone()));
            }
        }

        Ok(plan)
    }

    /// The spawned driver: runs to a terminal state, then unregisters
    async fn drive(self, mut context: RunContext, cancel: CancellationToken) {
        let run_id = context.run.id;
        if let Err(e) = self.run_loop(&mut context, &cancel).await {
            tracing::error!(run_id = %run_id, "run failed: {e}");
            context.run.status = RunStatus::Failed;
            context.run.error = Some(e.to_string());
            context.run.completed_at = Some(Utc::now());
            if let Err(update_err) = self.repos.runs.update(context.run.clone()).await {
                tracing::error!(run_id = %run_id, "failed to persist failed run: {update_err}");
            }
        }
        self.registry.remove(run_id);
    }

    async fn run_loop(
        &self,
        context: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        context.run.status = RunStatus::Running;
        context.run.started_at = Some(Utc::now());
        self.registry.set_status(context.run.id, RunStatus::Running);
        self.repos.runs.update(context.run.clone()).await?;

        let base_store = self
            .repos
            .variable_store(
                context.run.team_id,
                Some(&context.collection),
                context.environment.as_ref(),
            )
            .await?;

        let delay = Duration::from_millis(context.run.delay_between_requests_ms);
        let iteration_count = context.run.iteration_count;
        let request_count = context.plan.len();

        for iteration in 1..=iteration_count {
            // Each iteration gets a fresh local scope, seeded from its data
            // row; locals written by scripts stay visible for the rest of
            // the iteration
            let mut store = base_store.clone();
            if let Some(dataset) = &context.dataset {
                if let Some(row) = dataset.row(iteration - 1) {
                    for (key, value) in row {
                        store.set_local(key.clone(), value.clone());
                    }
                }
            }

            for index in 0..request_count {
                if cancel.is_cancelled() {
                    tracing::info!(run_id = %context.run.id, "run cancelled");
                    return self.finish(context, RunStatus::Cancelled).await;
                }

                let outcome = self.execute_one(context, index, &mut store).await;
                self.record_outcome(context, iteration, index, outcome)
                    .await?;

                let is_last = iteration == iteration_count && index == request_count - 1;
                if !is_last && !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.finish(context, RunStatus::Completed).await
    }

    async fn finish(&self, context: &mut RunContext, status: RunStatus) -> Result<()> {
        context.run.status = status;
        context.run.completed_at = Some(Utc::now());
        self.repos.runs.update(context.run.clone()).await?;
        tracing::info!(
            run_id = %context.run.id,
            status = ?status,
            total = context.run.total_requests,
            passed = context.run.passed_requests,
            "run finished"
        );
        Ok(())
    }

    /// Run the script chains around one dispatch and collect the outcome
    async fn execute_one(
        &self,
        context: &RunContext,
        index: usize,
        store: &mut VariableStore,
    ) -> RequestOutcome {
        let planned = &context.plan[index];
        let request = &planned.request;

        let mut view = ScriptRequestView {
            method: request.method.to_string(),
            url: request.url.clone(),
            headers: request
                .headers
                .iter()
                .filter(|h| h.is_enabled)
                .map(|h| (h.key.clone(), h.value.clone()))
                .collect(),
            body: request.body.as_ref().and_then(|b| b.raw.clone()),
        };

        let mut assertions: Vec<AssertionResult> = Vec::new();
        let mut script_error: Option<String> = None;

        // Pre-request: collection, then folders outermost to innermost,
        // then the request's own script
        let mut pre_sources: Vec<&str> = Vec::new();
        if let Some(source) = context.collection.pre_request_script.as_deref() {
            pre_sources.push(source);
        }
        for folder in &planned.folder_chain {
            if let Some(source) = folder.pre_request_script.as_deref() {
                pre_sources.push(source);
            }
        }
        if let Some(source) = request.script(ScriptType::PreRequest) {
            pre_sources.push(source);
        }

        for source in pre_sources {
            // Script source is a substitution target like any other field
            let source = expand(source, store).output;
            let execution = self
                .sandbox
                .execute(
                    ScriptPhase::PreRequest,
                    source,
                    store.clone(),
                    view.clone(),
                    None,
                )
                .await;
            *store = execution.store;
            view = execution.request;
            assertions.extend(execution.assertions);
            if let Some(error) = execution.error {
                script_error = Some(error);
                break;
            }
        }

        let resolved_url = expand(&request.url, store).output;

        if let Some(error) = script_error {
            // The request never leaves the process; record the iteration
            // error and let the run continue
            return RequestOutcome {
                url: resolved_url,
                status_code: 0,
                response_size_bytes: 0,
                response_time_ms: 0,
                passed: false,
                assertions,
                error: Some(error),
            };
        }

        let outbound = OutboundRequest {
            method: request.method,
            url: request.url.clone(),
            headers: view
                .headers
                .iter()
                .map(|(k, v)| KeyValueEntry::new(k.clone(), v.clone()))
                .collect(),
            params: request.params.clone(),
            body: request.body.clone(),
            auth: planned.auth.clone(),
            timeout_ms: None,
            follow_redirects: true,
            save_to_history: context.save_to_history,
            collection_id: Some(context.collection.id),
            request_id: Some(request.id),
            environment_id: context.environment.as_ref().map(|e| e.id),
        };

        let response = match self
            .executor
            .execute(outbound, store, &context.identity)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return RequestOutcome {
                    url: resolved_url,
                    status_code: 0,
                    response_size_bytes: 0,
                    response_time_ms: 0,
                    passed: false,
                    assertions,
                    error: Some(e.to_string()),
                };
            }
        };

        let executor_error = response.error.clone();

        // Post-response only runs when a dispatch happened: request first,
        // then folders innermost to outermost, then the collection
        let mut post_sources: Vec<&str> = Vec::new();
        if let Some(source) = request.script(ScriptType::PostResponse) {
            post_sources.push(source);
        }
        for folder in planned.folder_chain.iter().rev() {
            if let Some(source) = folder.post_response_script.as_deref() {
                post_sources.push(source);
            }
        }
        if let Some(source) = context.collection.post_response_script.as_deref() {
            post_sources.push(source);
        }

        let response_view = ScriptResponseView {
            code: response.status_code,
            status: response.status_text.clone(),
            headers: response
                .response_headers
                .iter()
                .flat_map(|(k, values)| values.iter().map(move |v| (k.clone(), v.clone())))
                .collect(),
            body: response.response_body.clone(),
            response_time_ms: response.response_time_ms,
        };

        let mut post_error: Option<String> = None;
        for source in post_sources {
            let source = expand(source, store).output;
            let execution = self
                .sandbox
                .execute(
                    ScriptPhase::PostResponse,
                    source,
                    store.clone(),
                    view.clone(),
                    Some(response_view.clone()),
                )
                .await;
            *store = execution.store;
            assertions.extend(execution.assertions);
            if let Some(error) = execution.error {
                post_error = Some(error);
                break;
            }
        }

        let has_script_error = post_error.is_some();
        let has_executor_error = executor_error.is_some();
        let iteration_error = post_error.or(executor_error);

        RequestOutcome {
            url: resolved_url,
            status_code: response.status_code,
            response_size_bytes: response.response_size_bytes,
            response_time_ms: response.response_time_ms,
            passed: request_passed(&assertions, has_script_error, has_executor_error),
            assertions,
            error: iteration_error,
        }
    }

    /// Fold one outcome into the run counters and persist the iteration
    async fn record_outcome(
        &self,
        context: &mut RunContext,
        iteration: u32,
        index: usize,
        outcome: RequestOutcome,
    ) -> Result<()> {
        let planned = &context.plan[index];
        let summary = summarize(&outcome.assertions);

        context.run.total_requests += 1;
        if outcome.passed {
            context.run.passed_requests += 1;
        } else {
            context.run.failed_requests += 1;
        }
        context.run.total_assertions += summary.total;
        context.run.passed_assertions += summary.passed;
        context.run.failed_assertions += summary.failed;
        context.run.total_duration_ms += outcome.response_time_ms;

        let record = RunIteration {
            id: Uuid::new_v4(),
            run_id: context.run.id,
            iteration,
            request_name: planned.request.name.clone(),
            method: planned.request.method.to_string(),
            url: outcome.url,
            status_code: outcome.status_code,
            response_size_bytes: outcome.response_size_bytes,
            response_time_ms: outcome.response_time_ms,
            passed: outcome.passed,
            assertion_results: serde_json::to_value(&outcome.assertions)
                .unwrap_or(serde_json::Value::Null),
            error: outcome.error,
            created_at: Utc::now(),
        };
        self.repos.runs.append_iteration(record).await?;
        self.repos.runs.update(context.run.clone()).await?;
        Ok(())
    }
}
