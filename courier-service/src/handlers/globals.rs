//! `/globals` endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::identity::CallerIdentity;
use crate::model::GlobalVariable;
use crate::state::AppState;
use crate::vars::SECRET_MASK;

fn masked(mut variable: GlobalVariable) -> GlobalVariable {
    if variable.is_secret {
        variable.value = SECRET_MASK.to_string();
    }
    variable
}

/// The team's global variables, secrets masked
pub async fn list(
    State(state): State<AppState>,
    identity: CallerIdentity,
) -> Result<Json<Vec<GlobalVariable>>> {
    let globals = state.repos.globals.list_by_team(identity.team_id).await?;
    Ok(Json(globals.into_iter().map(masked).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertGlobal {
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub is_secret: bool,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Insert or replace a global by key
pub async fn upsert(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(key): Path<String>,
    Json(body): Json<UpsertGlobal>,
) -> Result<Json<GlobalVariable>> {
    let variable = state
        .repos
        .globals
        .upsert(
            identity.team_id,
            &key,
            &body.value,
            body.is_secret,
            body.is_enabled,
        )
        .await?;
    Ok(Json(masked(variable)))
}

/// Remove a global by key
pub async fn remove(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(key): Path<String>,
) -> Result<Json<bool>> {
    let removed = state.repos.globals.delete(identity.team_id, &key).await?;
    Ok(Json(removed))
}
