use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use willow_server::{create_router, AppState, Config, ShutdownCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_level);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let addr = listener.local_addr()?;

    // Sub-agent processes call back into this URL for their tools.
    let tool_endpoint = format!("http://{addr}/api/tools/call");
    let state = AppState::build(&config, &tool_endpoint).context("failed to build engine")?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    let app = create_router(state.clone());
    tracing::info!(%addr, graph = %config.graph_path().display(), "Willow server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.wait_for_shutdown().await;
            tracing::info!("Shutting down: aborting in-flight work");
            state.abort_all();
        })
        .await?;
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
