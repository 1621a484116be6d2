//! Auth inheritance resolution and application

mod apply;
mod resolver;

pub use apply::{apply_auth, upsert_header, upsert_query, ApiKeyLocation, JwtAlgorithm};
pub use resolver::AuthResolver;
