//! Domain types for collections, requests, environments, history, and runs

mod auth;
mod collection;
mod environment;
mod history;
mod request;
mod run;

pub use auth::{AuthType, EffectiveAuth};
pub use collection::{Collection, Folder};
pub use environment::{Environment, GlobalVariable, Variable};
pub use history::{HistoryFilter, RequestHistory};
pub use request::{
    BodyType, HttpMethod, KeyValueEntry, RequestBody, RequestDefinition, Script, ScriptType,
};
pub use run::{RunIteration, RunResult, RunStatus};
