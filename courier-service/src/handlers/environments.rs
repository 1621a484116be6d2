//! `/environments` endpoints
//!
//! Secret variable values never leave these endpoints in clear; they are
//! replaced with the mask before serialization. The real values are only
//! substituted into outgoing wire requests.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::identity::CallerIdentity;
use crate::model::Environment;
use crate::state::AppState;
use crate::vars::SECRET_MASK;

fn masked(mut environment: Environment) -> Environment {
    for variable in &mut environment.variables {
        if variable.is_secret {
            variable.value = SECRET_MASK.to_string();
        }
    }
    environment
}

/// The team's environments, secrets masked
pub async fn list(
    State(state): State<AppState>,
    identity: CallerIdentity,
) -> Result<Json<Vec<Environment>>> {
    let environments = state
        .repos
        .environments
        .list_by_team(identity.team_id)
        .await?;
    Ok(Json(environments.into_iter().map(masked).collect()))
}

/// Atomically make this the team's single active environment
pub async fn activate(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Environment>> {
    let environment = state
        .repos
        .environments
        .activate(identity.team_id, id)
        .await?;
    Ok(Json(masked(environment)))
}
