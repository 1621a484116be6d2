//! Tracing initialization

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initialize tracing for the service
///
/// Uses JSON formatting so log shippers can index fields. The filter honours
/// `RUST_LOG` when set and falls back to the configured level.
pub fn init_tracing(config: &Config) {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tracing initialized for service: {}", config.service.name);
}
