//! Live run tracking
//!
//! Process-local map from run id to status and cancel signal. Entries exist
//! only while a run is live; after the terminal transition queries fall back
//! to the persisted `RunResult`.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::RunStatus;

struct RunHandle {
    status: RunStatus,
    cancel: CancellationToken,
}

/// Concurrent registry of in-flight runs
#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<Uuid, RunHandle>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new run; returns the token the driver polls for cancellation
    pub fn register(&self, run_id: Uuid) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.runs.insert(
            run_id,
            RunHandle {
                status: RunStatus::Pending,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    pub fn set_status(&self, run_id: Uuid, status: RunStatus) {
        if let Some(mut handle) = self.runs.get_mut(&run_id) {
            handle.status = status;
        }
    }

    /// Live status, if the run is still tracked in this process
    pub fn status(&self, run_id: Uuid) -> Option<RunStatus> {
        self.runs.get(&run_id).map(|handle| handle.status)
    }

    /// Signal cancellation; non-blocking, returns whether a live run was hit
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.runs.get(&run_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a run after its terminal transition
    pub fn remove(&self, run_id: Uuid) {
        self.runs.remove(&run_id);
    }
}
