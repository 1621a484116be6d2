use courier_service::config::Config;
use courier_service::observability::init_tracing;
use courier_service::server::{build_router, Server};
use courier_service::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config);

    let state = AppState::in_memory(config.clone())?;

    // Runs left RUNNING by a crash can never make progress again
    let swept = state.runner.sweep_orphans().await?;
    if swept > 0 {
        tracing::warn!("marked {swept} orphaned runs as failed");
    }

    let app = build_router(state);
    Server::new(config).serve(app).await?;

    Ok(())
}
