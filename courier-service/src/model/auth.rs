//! Authentication configuration types
//!
//! Auth configs are stored as an opaque JSON blob next to a type tag. The
//! resolver walks the inheritance chain without parsing the blob; only the
//! applier deserializes it into the per-scheme shapes it needs.

use serde::{Deserialize, Serialize};

/// Authentication scheme tag carried by requests, folders, and collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    NoAuth,
    InheritFromParent,
    ApiKey,
    BearerToken,
    BasicAuth,
    JwtBearer,
    Oauth2AuthorizationCode,
    Oauth2ClientCredentials,
}

impl AuthType {
    /// Whether this node defers to its parent in the inheritance chain
    pub fn is_inherit(&self) -> bool {
        matches!(self, AuthType::InheritFromParent)
    }

    /// Whether this scheme attaches a pre-obtained OAuth2 access token
    pub fn is_oauth2(&self) -> bool {
        matches!(
            self,
            AuthType::Oauth2AuthorizationCode | AuthType::Oauth2ClientCredentials
        )
    }
}

/// The auth configuration that applies to a request after inheritance
/// resolution
///
/// `config` is passed through verbatim from whichever node won the walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveAuth {
    pub auth_type: AuthType,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl EffectiveAuth {
    /// The terminal fallback when the whole chain inherits
    pub fn none() -> Self {
        Self {
            auth_type: AuthType::NoAuth,
            config: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&AuthType::NoAuth).unwrap(),
            "\"NO_AUTH\""
        );
        assert_eq!(
            serde_json::to_string(&AuthType::InheritFromParent).unwrap(),
            "\"INHERIT_FROM_PARENT\""
        );
        assert_eq!(
            serde_json::to_string(&AuthType::ApiKey).unwrap(),
            "\"API_KEY\""
        );
        assert_eq!(
            serde_json::to_string(&AuthType::JwtBearer).unwrap(),
            "\"JWT_BEARER\""
        );
        assert_eq!(
            serde_json::to_string(&AuthType::Oauth2AuthorizationCode).unwrap(),
            "\"OAUTH2_AUTHORIZATION_CODE\""
        );
    }

    #[test]
    fn test_inherit_and_oauth_predicates() {
        assert!(AuthType::InheritFromParent.is_inherit());
        assert!(!AuthType::BearerToken.is_inherit());
        assert!(AuthType::Oauth2ClientCredentials.is_oauth2());
        assert!(!AuthType::BasicAuth.is_oauth2());
    }

    #[test]
    fn test_effective_none() {
        let none = EffectiveAuth::none();
        assert_eq!(none.auth_type, AuthType::NoAuth);
        assert!(none.config.is_null());
    }
}
