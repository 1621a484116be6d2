//! Collections and folders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthType;
use super::environment::Variable;

/// Team-owned named container of folders holding requests
///
/// Names are unique per `(team_id, name)`. Scripts and auth configured here
/// apply to every request in the collection unless a folder or the request
/// itself overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Collection-scoped variables (between globals and the environment in
    /// resolution precedence)
    #[serde(default)]
    pub variables: Vec<Variable>,

    #[serde(default)]
    pub auth_type: Option<AuthType>,

    #[serde(default)]
    pub auth_config: Option<serde_json::Value>,

    #[serde(default)]
    pub pre_request_script: Option<String>,

    #[serde(default)]
    pub post_response_script: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tree node inside a collection; may nest, holds requests
///
/// Sibling folder names are free to collide. Scripts and auth here override
/// the collection's for requests below this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: Uuid,
    pub collection_id: Uuid,

    #[serde(default)]
    pub parent_folder_id: Option<Uuid>,

    pub name: String,

    #[serde(default)]
    pub sort_order: i32,

    #[serde(default)]
    pub auth_type: Option<AuthType>,

    #[serde(default)]
    pub auth_config: Option<serde_json::Value>,

    #[serde(default)]
    pub pre_request_script: Option<String>,

    #[serde(default)]
    pub post_response_script: Option<String>,

    pub created_at: DateTime<Utc>,
}
