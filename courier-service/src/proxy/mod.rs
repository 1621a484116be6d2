//! Proxy execution: dispatch, redirect tracking, capping, history

mod executor;
mod history;
mod types;

pub use executor::ProxyExecutor;
pub use history::{HistoryRecorder, TRUNCATION_MARKER};
pub use types::{OutboundRequest, ProxyResponse, SendRequestProxy};
