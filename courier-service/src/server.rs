//! Router assembly and HTTP server with graceful shutdown

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::Result;
use crate::handlers;
use crate::state::AppState;

/// Build the full service router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/proxy/send", post(handlers::proxy::send))
        .route("/runner/start", post(handlers::runner::start))
        .route("/runner", get(handlers::runner::list))
        .route("/runner/{id}", get(handlers::runner::get))
        .route("/runner/{id}/cancel", post(handlers::runner::cancel))
        .route("/runner/{id}/iterations", get(handlers::runner::iterations))
        .route(
            "/history",
            get(handlers::history::list).delete(handlers::history::prune),
        )
        .route("/environments", get(handlers::environments::list))
        .route(
            "/environments/{id}/activate",
            post(handlers::environments::activate),
        )
        .route("/globals", get(handlers::globals::list))
        .route(
            "/globals/{key}",
            put(handlers::globals::upsert).delete(handlers::globals::remove),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server with the given router until a shutdown signal
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);

        let listener = TcpListener::bind(&addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
