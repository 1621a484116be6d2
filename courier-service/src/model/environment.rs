//! Environments and variables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single variable entry inside an environment or collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub key: String,

    #[serde(default)]
    pub value: String,

    /// Secret values are redacted on listing but substituted verbatim on the
    /// wire
    #[serde(default)]
    pub is_secret: bool,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_secret: false,
            is_enabled: true,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            is_secret: true,
            ..Self::new(key, value)
        }
    }
}

/// Team-owned named variable set; at most one per team is active
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub variables: Vec<Variable>,

    pub created_at: DateTime<Utc>,
}

/// Team-wide variable; unique per `(team_id, key)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVariable {
    pub id: Uuid,
    pub team_id: Uuid,
    pub key: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub is_secret: bool,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,

    pub created_at: DateTime<Utc>,
}
