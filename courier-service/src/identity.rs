//! Caller identity passed down from the upstream authenticator
//!
//! Token validation and role extraction happen in an upstream gateway; this
//! service trusts the pre-validated headers it forwards:
//!
//! - `X-User-ID`: the authenticated user's id
//! - `X-Auth-Teams`: comma-separated team ids the user belongs to
//! - `X-Roles`: comma-separated role names (optional)
//! - `X-Team-ID`: the team scope the caller is operating in; must be one of
//!   the authenticated teams

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// The authenticated caller plus the team scope asserted for this request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Authenticated user id
    pub user_id: Uuid,

    /// Team scope for this request (validated against the caller's team set)
    pub team_id: Uuid,

    /// Role names granted by the authenticator
    pub roles: Vec<String>,
}

impl CallerIdentity {
    /// Check whether the caller carries a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Verify that an entity's owning team matches this caller's team scope
    pub fn assert_team(&self, owning_team: Uuid) -> Result<(), Error> {
        if owning_team == self.team_id {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "entity belongs to a different team".to_string(),
            ))
        }
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, "x-user-id")
            .ok_or_else(|| Error::Forbidden("missing X-User-ID header".to_string()))?
            .parse::<Uuid>()
            .map_err(|_| Error::Forbidden("malformed X-User-ID header".to_string()))?;

        let team_id = header_str(parts, "x-team-id")
            .ok_or_else(|| Error::Forbidden("missing X-Team-ID header".to_string()))?
            .parse::<Uuid>()
            .map_err(|_| Error::Forbidden("malformed X-Team-ID header".to_string()))?;

        let teams: Vec<Uuid> = header_str(parts, "x-auth-teams")
            .unwrap_or_default()
            .split(',')
            .filter_map(|t| t.trim().parse::<Uuid>().ok())
            .collect();

        if !teams.contains(&team_id) {
            return Err(Error::Forbidden(
                "X-Team-ID is not one of the caller's teams".to_string(),
            ));
        }

        let roles = header_str(parts, "x-roles")
            .unwrap_or_default()
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        Ok(CallerIdentity {
            user_id,
            team_id,
            roles,
        })
    }
}
