//! Warpify Gateway
//!
//! Serves the REST API over the engine's agents.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use warpify_gateway::{build_router, state::AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .json()
        .init();

    info!("Starting Warpify Gateway v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Gateway listening on {}", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
