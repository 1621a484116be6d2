//! Data passed into and out of a script execution

use serde::{Deserialize, Serialize};

use crate::vars::VariableStore;

/// Which hook the script runs in; gates the mutable parts of the `pm` surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    PreRequest,
    PostResponse,
}

/// The outgoing request as scripts see it
///
/// Pre-request scripts may mutate the header list; everything else is
/// read-only.
#[derive(Debug, Clone, Default)]
pub struct ScriptRequestView {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// The upstream response as post-response scripts see it
#[derive(Debug, Clone, Default)]
pub struct ScriptResponseView {
    pub code: u16,
    pub status: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub response_time_ms: u64,
}

/// One named check recorded by `pm.test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a script execution produced
///
/// The store and request views carry any mutations the script made; they
/// replace the caller's copies on success. `error` is set on compile
/// failure, runtime failure, or timeout; assertions recorded before the
/// failure are kept.
#[derive(Debug, Clone)]
pub struct ScriptExecution {
    pub store: VariableStore,
    pub request: ScriptRequestView,
    pub assertions: Vec<AssertionResult>,
    pub console: Vec<String>,
    pub error: Option<String>,
}
