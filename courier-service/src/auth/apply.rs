//! Converts effective auth into header/query mutations
//!
//! Every credential string is template-expanded before use, and every
//! mutation is an upsert, so re-applying the same auth (as the redirect loop
//! does on each hop) leaves the outgoing header and query sets unchanged.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{AuthType, EffectiveAuth};
use crate::vars::{expand, VariableStore};

/// Where an API key lands on the outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyConfig {
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    add_to: ApiKeyLocation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BearerConfig {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BasicConfig {
    username: String,
    #[serde(default)]
    password: String,
}

/// HMAC algorithms supported for JWT bearer signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum JwtAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwtBearerConfig {
    secret: String,
    #[serde(default = "default_jwt_payload")]
    payload: String,
    #[serde(default)]
    algorithm: JwtAlgorithm,
}

fn default_jwt_payload() -> String {
    "{}".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuth2Config {
    access_token: String,
}

/// Replace or insert a header, matching names case-insensitively
pub fn upsert_header(headers: &mut Vec<(String, String)>, key: &str, value: String) {
    if let Some(pos) = headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(key)) {
        headers[pos].1 = value;
    } else {
        headers.push((key.to_string(), value));
    }
}

/// Replace or insert a query parameter
pub fn upsert_query(query: &mut Vec<(String, String)>, key: &str, value: String) {
    if let Some(pos) = query.iter().position(|(k, _)| k == key) {
        query[pos].1 = value;
    } else {
        query.push((key.to_string(), value));
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(
    auth_type: AuthType,
    config: &serde_json::Value,
) -> Result<T> {
    serde_json::from_value(config.clone()).map_err(|e| {
        Error::Validation(format!("invalid {auth_type:?} auth config: {e}"))
    })
}

/// Apply the effective auth to the outgoing header and query sets
///
/// Returns the unresolved variable names encountered while expanding
/// credential fields, for the caller's diagnostics.
pub fn apply_auth(
    auth: &EffectiveAuth,
    store: &VariableStore,
    headers: &mut Vec<(String, String)>,
    query: &mut Vec<(String, String)>,
) -> Result<Vec<String>> {
    let mut unresolved: Vec<String> = Vec::new();
    let mut render = |template: &str| -> String {
        let expansion = expand(template, store);
        for name in expansion.unresolved {
            if !unresolved.iter().any(|u| u == &name) {
                unresolved.push(name);
            }
        }
        expansion.output
    };

    match auth.auth_type {
        AuthType::NoAuth | AuthType::InheritFromParent => {}

        AuthType::ApiKey => {
            let config: ApiKeyConfig = parse_config(auth.auth_type, &auth.config)?;
            let key = render(&config.key);
            let value = render(&config.value);
            match config.add_to {
                ApiKeyLocation::Header => upsert_header(headers, &key, value),
                ApiKeyLocation::Query => upsert_query(query, &key, value),
            }
        }

        AuthType::BearerToken => {
            let config: BearerConfig = parse_config(auth.auth_type, &auth.config)?;
            let token = render(&config.token);
            upsert_header(headers, "Authorization", format!("Bearer {token}"));
        }

        AuthType::BasicAuth => {
            let config: BasicConfig = parse_config(auth.auth_type, &auth.config)?;
            let username = render(&config.username);
            let password = render(&config.password);
            let encoded = BASE64.encode(format!("{username}:{password}"));
            upsert_header(headers, "Authorization", format!("Basic {encoded}"));
        }

        AuthType::JwtBearer => {
            let config: JwtBearerConfig = parse_config(auth.auth_type, &auth.config)?;
            let secret = render(&config.secret);
            let payload = render(&config.payload);
            let claims: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|e| Error::Validation(format!("invalid JWT payload: {e}")))?;
            let token = jsonwebtoken::encode(
                &Header::new(config.algorithm.into()),
                &claims,
                &EncodingKey::from_secret(secret.as_bytes()),
            )
            .map_err(|e| Error::Validation(format!("JWT signing failed: {e}")))?;
            upsert_header(headers, "Authorization", format!("Bearer {token}"));
        }

        AuthType::Oauth2AuthorizationCode | AuthType::Oauth2ClientCredentials => {
            // Token exchange happens elsewhere; the core only attaches the
            // already-obtained access token.
            let config: OAuth2Config = parse_config(auth.auth_type, &auth.config)?;
            let token = render(&config.access_token);
            upsert_header(headers, "Authorization", format!("Bearer {token}"));
        }
    }

    Ok(unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::VariableScope;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    fn store() -> VariableStore {
        let mut store = VariableStore::new();
        store.set_scoped(VariableScope::Environment, "token", "xyz");
        store.set_local("user", "user");
        store.set_local("pass", "hunter2");
        store
    }

    fn auth(auth_type: AuthType, config: serde_json::Value) -> EffectiveAuth {
        EffectiveAuth { auth_type, config }
    }

    #[test]
    fn test_no_auth_leaves_request_untouched() {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        let mut query = vec![];
        apply_auth(&EffectiveAuth::none(), &store(), &mut headers, &mut query).unwrap();
        assert_eq!(headers.len(), 1);
        assert!(query.is_empty());
    }

    #[test]
    fn test_bearer_token_expanded() {
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(
            &auth(AuthType::BearerToken, json!({"token": "{{token}}"})),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap();
        assert_eq!(
            headers,
            vec![("Authorization".to_string(), "Bearer xyz".to_string())]
        );
    }

    #[test]
    fn test_basic_auth_encodes_credentials() {
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(
            &auth(
                AuthType::BasicAuth,
                json!({"username": "{{user}}", "password": "{{pass}}"}),
            ),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap();
        // base64("user:hunter2")
        assert_eq!(
            headers,
            vec![(
                "Authorization".to_string(),
                "Basic dXNlcjpodW50ZXIy".to_string()
            )]
        );
    }

    #[test]
    fn test_api_key_header_and_query_placement() {
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(
            &auth(
                AuthType::ApiKey,
                json!({"key": "X-Api-Key", "value": "{{token}}", "addTo": "header"}),
            ),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap();
        assert_eq!(headers, vec![("X-Api-Key".to_string(), "xyz".to_string())]);

        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(
            &auth(
                AuthType::ApiKey,
                json!({"key": "api_key", "value": "{{token}}", "addTo": "query"}),
            ),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap();
        assert!(headers.is_empty());
        assert_eq!(query, vec![("api_key".to_string(), "xyz".to_string())]);
    }

    #[test]
    fn test_jwt_bearer_signs_expanded_payload() {
        let mut store = store();
        store.set_local("subject", "svc-42");
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(
            &auth(
                AuthType::JwtBearer,
                json!({
                    "secret": "s3cret",
                    "payload": "{\"sub\": \"{{subject}}\"}",
                    "algorithm": "HS256"
                }),
            ),
            &store,
            &mut headers,
            &mut query,
        )
        .unwrap();

        let value = &headers[0].1;
        let token = value.strip_prefix("Bearer ").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims_json = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&claims_json).unwrap();
        assert_eq!(claims, json!({"sub": "svc-42"}));

        let header_json = URL_SAFE_NO_PAD.decode(parts[0]).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header_json).unwrap();
        assert_eq!(header["alg"], "HS256");
    }

    #[test]
    fn test_oauth2_attaches_access_token() {
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(
            &auth(
                AuthType::Oauth2ClientCredentials,
                json!({"accessToken": "at-123"}),
            ),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap();
        assert_eq!(
            headers,
            vec![("Authorization".to_string(), "Bearer at-123".to_string())]
        );
    }

    #[test]
    fn test_application_is_idempotent() {
        let bearer = auth(AuthType::BearerToken, json!({"token": "{{token}}"}));
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(&bearer, &store(), &mut headers, &mut query).unwrap();
        let once = headers.clone();
        apply_auth(&bearer, &store(), &mut headers, &mut query).unwrap();
        assert_eq!(headers, once);

        let key = auth(
            AuthType::ApiKey,
            json!({"key": "api_key", "value": "v", "addTo": "query"}),
        );
        let mut headers = vec![];
        let mut query = vec![];
        apply_auth(&key, &store(), &mut headers, &mut query).unwrap();
        apply_auth(&key, &store(), &mut headers, &mut query).unwrap();
        assert_eq!(query, vec![("api_key".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_unresolved_credentials_reported() {
        let mut headers = vec![];
        let mut query = vec![];
        let unresolved = apply_auth(
            &auth(AuthType::BearerToken, json!({"token": "{{missingToken}}"})),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap();
        assert_eq!(unresolved, vec!["missingToken"]);
        assert_eq!(headers[0].1, "Bearer ");
    }

    #[test]
    fn test_malformed_config_is_a_validation_error() {
        let mut headers = vec![];
        let mut query = vec![];
        let err = apply_auth(
            &auth(AuthType::BearerToken, json!({"nope": true})),
            &store(),
            &mut headers,
            &mut query,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
