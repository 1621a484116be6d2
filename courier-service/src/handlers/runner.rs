//! `/runner` endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::identity::CallerIdentity;
use crate::model::{RunIteration, RunResult};
use crate::pagination::{Page, PageParams};
use crate::runner::StartRunRequest;
use crate::state::AppState;

/// Start a collection run asynchronously; the body carries the PENDING run
pub async fn start(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<RunResult>)> {
    let run = state.runner.start(request, identity).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Current status plus partial stats
pub async fn get(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResult>> {
    Ok(Json(state.runner.get(id, &identity).await?))
}

/// Newest-first page of the team's runs
pub async fn list(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<RunResult>>> {
    Ok(Json(state.runner.list(&identity, page).await?))
}

/// Non-blocking cancel signal
pub async fn cancel(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResult>> {
    Ok(Json(state.runner.cancel(id, &identity).await?))
}

/// Paginated iterations of one run
pub async fn iterations(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<RunIteration>>> {
    Ok(Json(state.runner.iterations(id, &identity, page).await?))
}
