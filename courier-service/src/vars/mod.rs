//! Variable resolution: scoped store plus `{{name}}` template expansion

mod store;
mod template;

pub use store::{
    ResolvedVariable, VariableEntry, VariableScope, VariableStore, SECRET_MASK,
};
pub use template::{expand, Expansion};
