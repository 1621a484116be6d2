//! Collection runs: data files, live registry, and the runner itself

mod data;
mod registry;
mod run;

pub use data::DataSet;
pub use registry::RunRegistry;
pub use run::{CollectionRunner, StartRunRequest};
