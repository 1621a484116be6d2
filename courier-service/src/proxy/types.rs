//! Wire and internal types for proxy execution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{EffectiveAuth, HttpMethod, KeyValueEntry, RequestBody};

fn default_true() -> bool {
    true
}

/// `POST /proxy/send` request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestProxy {
    pub method: HttpMethod,

    /// URL template; may contain `{{name}}` placeholders
    pub url: String,

    #[serde(default)]
    pub headers: Vec<KeyValueEntry>,

    /// Query parameters appended to the URL
    #[serde(default)]
    pub params: Vec<KeyValueEntry>,

    #[serde(default)]
    pub body: Option<RequestBody>,

    /// Explicit auth; `INHERIT_FROM_PARENT` resolves through `request_id`
    /// when given, otherwise falls back to no auth
    #[serde(default)]
    pub auth: Option<EffectiveAuth>,

    #[serde(default)]
    pub environment_id: Option<Uuid>,

    #[serde(default)]
    pub collection_id: Option<Uuid>,

    #[serde(default)]
    pub request_id: Option<Uuid>,

    #[serde(default = "default_true")]
    pub save_to_history: bool,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub follow_redirects: bool,
}

/// Fully specified outgoing request handed to the executor
///
/// Values are still templates; the executor performs the substitution pass so
/// that script-added headers are expanded too.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<KeyValueEntry>,
    pub params: Vec<KeyValueEntry>,
    pub body: Option<RequestBody>,
    pub auth: EffectiveAuth,
    pub timeout_ms: Option<u64>,
    pub follow_redirects: bool,
    pub save_to_history: bool,
    pub collection_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub environment_id: Option<Uuid>,
}

impl OutboundRequest {
    /// Build from the wire format with auth already resolved
    pub fn from_wire(request: SendRequestProxy, auth: EffectiveAuth) -> Self {
        Self {
            method: request.method,
            url: request.url,
            headers: request.headers,
            params: request.params,
            body: request.body,
            auth,
            timeout_ms: request.timeout_ms,
            follow_redirects: request.follow_redirects,
            save_to_history: request.save_to_history,
            collection_id: request.collection_id,
            request_id: request.request_id,
            environment_id: request.environment_id,
        }
    }
}

/// Everything observed about one proxy execution
///
/// Upstream failures are represented here too: `status_code == 0` with an
/// `error` marker, never an API-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub status_text: String,

    #[serde(default)]
    pub response_headers: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub response_body: String,

    pub response_time_ms: u64,
    pub response_size_bytes: u64,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Absolute URL of every redirect hop taken, in order
    #[serde(default)]
    pub redirect_chain: Vec<String>,

    /// True when the captured body hit the configured cap
    #[serde(default)]
    pub body_truncated: bool,

    /// True when the hop limit was reached while the upstream kept
    /// redirecting
    #[serde(default)]
    pub redirect_chain_overflow: bool,

    /// Placeholder names that had no value during substitution
    #[serde(default)]
    pub unresolved_variables: Vec<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub history_id: Option<Uuid>,
}
