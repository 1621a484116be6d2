//! Request history records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::request::HttpMethod;

/// Denormalized, append-only record of one executed request
///
/// Entries are immutable once written. Body fields are truncated at the
/// configured cap before storage and flagged when cut.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHistory {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,

    pub method: HttpMethod,

    /// Fully resolved URL as sent on the wire
    pub url: String,

    #[serde(default)]
    pub request_headers: HashMap<String, String>,

    #[serde(default)]
    pub request_body: Option<String>,

    #[serde(default)]
    pub request_body_truncated: bool,

    /// Final response status; 0 when the upstream was never reached
    pub status_code: u16,

    #[serde(default)]
    pub status_text: String,

    #[serde(default)]
    pub response_headers: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub response_body: Option<String>,

    #[serde(default)]
    pub response_body_truncated: bool,

    pub response_size_bytes: u64,
    pub duration_ms: u64,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Upstream failure marker (UPSTREAM_UNREACHABLE, UPSTREAM_TIMEOUT,
    /// UPSTREAM_IO) when the request never produced a real response
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub collection_id: Option<Uuid>,

    #[serde(default)]
    pub request_id: Option<Uuid>,

    #[serde(default)]
    pub environment_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Filter applied to history listings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    #[serde(default)]
    pub method: Option<HttpMethod>,

    /// Substring match on the resolved URL
    #[serde(default)]
    pub url_contains: Option<String>,

    #[serde(default)]
    pub since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    /// Whether the given entry passes this filter
    pub fn matches(&self, entry: &RequestHistory) -> bool {
        if let Some(method) = self.method {
            if entry.method != method {
                return false;
            }
        }
        if let Some(ref fragment) = self.url_contains {
            if !entry.url.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.created_at >= until {
                return false;
            }
        }
        true
    }
}
