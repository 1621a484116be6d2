//! Auth inheritance resolution
//!
//! Walks request → folder chain (nearest first) → collection and returns the
//! first node that does not defer to its parent. The opaque config blob is
//! passed through verbatim; parsing it is the applier's job.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::{AuthType, Collection, EffectiveAuth, RequestDefinition};
use crate::repository::FolderRepository;

/// Resolves the effective auth for a stored request
pub struct AuthResolver<'a> {
    folders: &'a dyn FolderRepository,
}

impl<'a> AuthResolver<'a> {
    pub fn new(folders: &'a dyn FolderRepository) -> Self {
        Self { folders }
    }

    /// Effective auth for `request` inside `collection`
    ///
    /// A revisited folder id during the ancestor walk means the tree has a
    /// cycle; that is a data integrity fault, not a caller error.
    pub async fn resolve(
        &self,
        request: &RequestDefinition,
        collection: &Collection,
    ) -> Result<EffectiveAuth> {
        if let Some(auth_type) = request.auth_type {
            if !auth_type.is_inherit() {
                return Ok(effective(auth_type, request.auth_config.clone()));
            }
        }

        let mut visited: HashSet<uuid::Uuid> = HashSet::new();
        let mut cursor = Some(request.folder_id);
        while let Some(folder_id) = cursor {
            if !visited.insert(folder_id) {
                return Err(Error::Internal(format!(
                    "folder hierarchy cycle detected at {folder_id}"
                )));
            }
            let folder = self
                .folders
                .get(folder_id)
                .await?
                .ok_or_else(|| Error::not_found("Folder", folder_id))?;
            if let Some(auth_type) = folder.auth_type {
                if !auth_type.is_inherit() {
                    return Ok(effective(auth_type, folder.auth_config.clone()));
                }
            }
            cursor = folder.parent_folder_id;
        }

        if let Some(auth_type) = collection.auth_type {
            if !auth_type.is_inherit() {
                return Ok(effective(auth_type, collection.auth_config.clone()));
            }
        }

        Ok(EffectiveAuth::none())
    }
}

fn effective(auth_type: AuthType, config: Option<serde_json::Value>) -> EffectiveAuth {
    EffectiveAuth {
        auth_type,
        config: config.unwrap_or(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Folder, HttpMethod};
    use crate::repository::{FolderRepository as _, InMemoryStore};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn collection_with_auth(
        auth_type: Option<AuthType>,
        config: Option<serde_json::Value>,
    ) -> Collection {
        Collection {
            id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            name: "api".to_string(),
            description: None,
            variables: vec![],
            auth_type,
            auth_config: config,
            pre_request_script: None,
            post_response_script: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn folder_with_auth(
        collection_id: Uuid,
        parent: Option<Uuid>,
        auth_type: Option<AuthType>,
        config: Option<serde_json::Value>,
    ) -> Folder {
        Folder {
            id: Uuid::new_v4(),
            collection_id,
            parent_folder_id: parent,
            name: "folder".to_string(),
            sort_order: 0,
            auth_type,
            auth_config: config,
            pre_request_script: None,
            post_response_script: None,
            created_at: Utc::now(),
        }
    }

    fn request_in(
        folder_id: Uuid,
        auth_type: Option<AuthType>,
        config: Option<serde_json::Value>,
    ) -> RequestDefinition {
        RequestDefinition {
            id: Uuid::new_v4(),
            folder_id,
            name: "r".to_string(),
            method: HttpMethod::Get,
            url: "http://a.test/".to_string(),
            sort_order: 0,
            headers: vec![],
            params: vec![],
            body: None,
            auth_type,
            auth_config: config,
            scripts: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_request_own_auth_wins() {
        let store = InMemoryStore::new();
        let collection = collection_with_auth(Some(AuthType::BasicAuth), None);
        let folder = folder_with_auth(collection.id, None, Some(AuthType::ApiKey), None);
        store.save(folder.clone()).await.unwrap();
        let request = request_in(
            folder.id,
            Some(AuthType::BearerToken),
            Some(json!({"token": "own"})),
        );

        let resolved = AuthResolver::new(&store)
            .resolve(&request, &collection)
            .await
            .unwrap();
        assert_eq!(resolved.auth_type, AuthType::BearerToken);
        assert_eq!(resolved.config, json!({"token": "own"}));
    }

    #[tokio::test]
    async fn test_inherit_ascends_to_collection() {
        // Collection BEARER_TOKEN, folder INHERIT, request INHERIT
        let store = InMemoryStore::new();
        let collection = collection_with_auth(
            Some(AuthType::BearerToken),
            Some(json!({"token": "abc"})),
        );
        let folder = folder_with_auth(
            collection.id,
            None,
            Some(AuthType::InheritFromParent),
            None,
        );
        store.save(folder.clone()).await.unwrap();
        let request = request_in(folder.id, Some(AuthType::InheritFromParent), None);

        let resolved = AuthResolver::new(&store)
            .resolve(&request, &collection)
            .await
            .unwrap();
        assert_eq!(resolved.auth_type, AuthType::BearerToken);
        assert_eq!(resolved.config, json!({"token": "abc"}));
    }

    #[tokio::test]
    async fn test_nearest_folder_wins_over_outer() {
        let store = InMemoryStore::new();
        let collection = collection_with_auth(Some(AuthType::BasicAuth), None);
        let outer = folder_with_auth(
            collection.id,
            None,
            Some(AuthType::ApiKey),
            Some(json!({"key": "X-Outer", "value": "o"})),
        );
        let inner = folder_with_auth(
            collection.id,
            Some(outer.id),
            Some(AuthType::BearerToken),
            Some(json!({"token": "inner"})),
        );
        store.save(outer.clone()).await.unwrap();
        store.save(inner.clone()).await.unwrap();
        let request = request_in(inner.id, None, None);

        let resolved = AuthResolver::new(&store)
            .resolve(&request, &collection)
            .await
            .unwrap();
        assert_eq!(resolved.auth_type, AuthType::BearerToken);
    }

    #[tokio::test]
    async fn test_exhausted_chain_yields_no_auth() {
        let store = InMemoryStore::new();
        let collection = collection_with_auth(Some(AuthType::InheritFromParent), None);
        let outer = folder_with_auth(
            collection.id,
            None,
            Some(AuthType::InheritFromParent),
            None,
        );
        let inner = folder_with_auth(
            collection.id,
            Some(outer.id),
            Some(AuthType::InheritFromParent),
            None,
        );
        store.save(outer.clone()).await.unwrap();
        store.save(inner.clone()).await.unwrap();
        let request = request_in(inner.id, Some(AuthType::InheritFromParent), None);

        let resolved = AuthResolver::new(&store)
            .resolve(&request, &collection)
            .await
            .unwrap();
        assert_eq!(resolved.auth_type, AuthType::NoAuth);
    }

    #[tokio::test]
    async fn test_folder_cycle_fails_internal() {
        let store = InMemoryStore::new();
        let collection = collection_with_auth(None, None);
        let mut a = folder_with_auth(collection.id, None, None, None);
        let b = folder_with_auth(collection.id, Some(a.id), None, None);
        a.parent_folder_id = Some(b.id);
        store.save(a.clone()).await.unwrap();
        store.save(b.clone()).await.unwrap();
        let request = request_in(a.id, None, None);

        let err = AuthResolver::new(&store)
            .resolve(&request, &collection)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_config_blob_not_reparsed() {
        // An arbitrarily shaped blob survives resolution untouched
        let store = InMemoryStore::new();
        let blob = json!({"nested": {"weird": [1, 2, {"x": null}]}, "extra": true});
        let collection = collection_with_auth(Some(AuthType::ApiKey), Some(blob.clone()));
        let folder = folder_with_auth(collection.id, None, None, None);
        store.save(folder.clone()).await.unwrap();
        let request = request_in(folder.id, None, None);

        let resolved = AuthResolver::new(&store)
            .resolve(&request, &collection)
            .await
            .unwrap();
        assert_eq!(resolved.config, blob);
    }
}
