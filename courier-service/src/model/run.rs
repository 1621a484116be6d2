//! Collection run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a collection run
///
/// PENDING → RUNNING → one terminal state, reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether this state ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// One execution of a collection across N iterations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub id: Uuid,
    pub team_id: Uuid,
    pub collection_id: Uuid,

    #[serde(default)]
    pub environment_id: Option<Uuid>,

    pub status: RunStatus,

    pub total_requests: u64,
    pub passed_requests: u64,
    pub failed_requests: u64,
    pub total_assertions: u64,
    pub passed_assertions: u64,
    pub failed_assertions: u64,

    /// Sum of per-request wire time in milliseconds
    pub total_duration_ms: u64,

    pub iteration_count: u32,
    pub delay_between_requests_ms: u64,

    #[serde(default)]
    pub data_filename: Option<String>,

    /// Set by the startup sweep when a RUNNING run was abandoned by a crash
    #[serde(default)]
    pub orphaned: bool,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Set iff status is terminal
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl RunResult {
    /// Create a new run in PENDING with zeroed counters
    pub fn pending(
        team_id: Uuid,
        collection_id: Uuid,
        environment_id: Option<Uuid>,
        iteration_count: u32,
        delay_between_requests_ms: u64,
        data_filename: Option<String>,
        created_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            collection_id,
            environment_id,
            status: RunStatus::Pending,
            total_requests: 0,
            passed_requests: 0,
            failed_requests: 0,
            total_assertions: 0,
            passed_assertions: 0,
            failed_assertions: 0,
            total_duration_ms: 0,
            iteration_count,
            delay_between_requests_ms,
            data_filename,
            orphaned: false,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            created_by,
        }
    }
}

/// One request execution inside a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIteration {
    pub id: Uuid,
    pub run_id: Uuid,

    /// 1-based iteration number
    pub iteration: u32,

    pub request_name: String,
    pub method: String,

    /// Fully resolved URL as dispatched
    pub url: String,

    /// 0 when the upstream was never reached
    pub status_code: u16,

    pub response_size_bytes: u64,
    pub response_time_ms: u64,

    /// False when any assertion failed, a script errored, or the executor
    /// reported an upstream failure
    pub passed: bool,

    /// JSON-serialized assertion results recorded by the scripts
    pub assertion_results: serde_json::Value,

    #[serde(default)]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_pending_run_starts_zeroed() {
        let run = RunResult::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            3,
            250,
            Some("users.csv".to_string()),
            Uuid::new_v4(),
        );
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.total_requests, 0);
        assert!(run.started_at.is_none());
        assert!(run.completed_at.is_none());
        assert!(!run.orphaned);
    }
}
