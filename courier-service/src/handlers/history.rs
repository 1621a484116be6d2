//! `/history` endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::CallerIdentity;
use crate::model::{HistoryFilter, RequestHistory};
use crate::pagination::{Page, PageParams};
use crate::state::AppState;

/// Paginated, filtered history for the caller's team
pub async fn list(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Query(filter): Query<HistoryFilter>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<RequestHistory>>> {
    let (items, total) = state
        .repos
        .history
        .list_by_team(identity.team_id, &filter, page)
        .await?;
    Ok(Json(Page::new(items, total, page)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneParams {
    pub before: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub removed: u64,
}

/// Delete history entries created before the cutoff
pub async fn prune(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Query(params): Query<PruneParams>,
) -> Result<Json<PruneOutcome>> {
    let removed = state
        .repos
        .history
        .prune_older_than(identity.team_id, params.before)
        .await?;
    Ok(Json(PruneOutcome { removed }))
}
