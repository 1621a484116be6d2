//! Script sandbox and assertion aggregation

mod assertions;
mod context;
mod sandbox;

pub use assertions::{request_passed, summarize, AssertionSummary};
pub use context::{
    AssertionResult, ScriptExecution, ScriptPhase, ScriptRequestView, ScriptResponseView,
};
pub use sandbox::{Sandbox, SCRIPT_TIMEOUT};
