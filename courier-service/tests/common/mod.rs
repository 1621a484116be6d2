//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::Utc;
use uuid::Uuid;

use courier_service::config::Config;
use courier_service::identity::CallerIdentity;
use courier_service::model::{
    AuthType, Collection, Folder, HttpMethod, KeyValueEntry, RequestDefinition, Script,
    ScriptType, Variable,
};
use courier_service::state::AppState;

pub fn identity() -> CallerIdentity {
    CallerIdentity {
        user_id: Uuid::new_v4(),
        team_id: Uuid::new_v4(),
        roles: vec!["member".to_string()],
    }
}

pub fn state() -> AppState {
    state_with(Config::default())
}

pub fn state_with(config: Config) -> AppState {
    AppState::in_memory(config).expect("state builds")
}

pub fn collection(team_id: Uuid, name: &str) -> Collection {
    Collection {
        id: Uuid::new_v4(),
        team_id,
        name: name.to_string(),
        description: None,
        variables: vec![],
        auth_type: None,
        auth_config: None,
        pre_request_script: None,
        post_response_script: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn folder(collection_id: Uuid, parent: Option<Uuid>, name: &str, sort: i32) -> Folder {
    Folder {
        id: Uuid::new_v4(),
        collection_id,
        parent_folder_id: parent,
        name: name.to_string(),
        sort_order: sort,
        auth_type: None,
        auth_config: None,
        pre_request_script: None,
        post_response_script: None,
        created_at: Utc::now(),
    }
}

pub fn request(folder_id: Uuid, name: &str, method: HttpMethod, url: &str) -> RequestDefinition {
    RequestDefinition {
        id: Uuid::new_v4(),
        folder_id,
        name: name.to_string(),
        method,
        url: url.to_string(),
        sort_order: 0,
        headers: vec![],
        params: vec![],
        body: None,
        auth_type: None,
        auth_config: None,
        scripts: vec![],
        created_at: Utc::now(),
    }
}

pub fn post_response_script(source: &str) -> Script {
    Script {
        script_type: ScriptType::PostResponse,
        source: source.to_string(),
    }
}

pub fn pre_request_script(source: &str) -> Script {
    Script {
        script_type: ScriptType::PreRequest,
        source: source.to_string(),
    }
}

pub fn variable(key: &str, value: &str) -> Variable {
    Variable::new(key, value)
}

pub fn secret_variable(key: &str, value: &str) -> Variable {
    Variable::secret(key, value)
}

pub fn header(key: &str, value: &str) -> KeyValueEntry {
    KeyValueEntry::new(key, value)
}

pub fn inherit_auth() -> Option<AuthType> {
    Some(AuthType::InheritFromParent)
}
