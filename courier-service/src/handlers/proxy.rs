//! `POST /proxy/send`

use axum::{extract::State, Json};

use crate::auth::AuthResolver;
use crate::error::{Error, Result};
use crate::identity::CallerIdentity;
use crate::model::{Collection, EffectiveAuth, Environment};
use crate::proxy::{OutboundRequest, ProxyResponse, SendRequestProxy};
use crate::state::AppState;

/// Execute an ad-hoc request on behalf of the caller
pub async fn send(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Json(request): Json<SendRequestProxy>,
) -> Result<Json<ProxyResponse>> {
    let collection = load_collection(&state, &identity, &request).await?;
    let environment = load_environment(&state, &identity, &request).await?;

    let store = state
        .repos
        .variable_store(identity.team_id, collection.as_ref(), environment.as_ref())
        .await?;

    let auth = resolve_auth(&state, &request, collection.as_ref()).await?;
    let outbound = OutboundRequest::from_wire(request, auth);
    let response = state.executor.execute(outbound, &store, &identity).await?;
    Ok(Json(response))
}

async fn load_collection(
    state: &AppState,
    identity: &CallerIdentity,
    request: &SendRequestProxy,
) -> Result<Option<Collection>> {
    match request.collection_id {
        Some(id) => {
            let collection = state
                .repos
                .collections
                .get(id)
                .await?
                .ok_or_else(|| Error::not_found("Collection", id))?;
            identity.assert_team(collection.team_id)?;
            Ok(Some(collection))
        }
        None => Ok(None),
    }
}

async fn load_environment(
    state: &AppState,
    identity: &CallerIdentity,
    request: &SendRequestProxy,
) -> Result<Option<Environment>> {
    match request.environment_id {
        Some(id) => {
            let environment = state
                .repos
                .environments
                .get(id)
                .await?
                .ok_or_else(|| Error::not_found("Environment", id))?;
            identity.assert_team(environment.team_id)?;
            Ok(Some(environment))
        }
        None => Ok(state.repos.environments.find_active(identity.team_id).await?),
    }
}

/// Explicit wire auth wins; `INHERIT_FROM_PARENT` walks the stored request's
/// chain when one is referenced, and otherwise degrades to no auth
async fn resolve_auth(
    state: &AppState,
    request: &SendRequestProxy,
    collection: Option<&Collection>,
) -> Result<EffectiveAuth> {
    match &request.auth {
        Some(auth) if !auth.auth_type.is_inherit() => Ok(auth.clone()),
        _ => {
            if let (Some(request_id), Some(collection)) = (request.request_id, collection) {
                let stored = state
                    .repos
                    .requests
                    .get(request_id)
                    .await?
                    .ok_or_else(|| Error::not_found("Request", request_id))?;
                AuthResolver::new(state.repos.folders.as_ref())
                    .resolve(&stored, collection)
                    .await
            } else {
                Ok(EffectiveAuth::none())
            }
        }
    }
}
