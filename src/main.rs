use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use aidgate::{build_router, CliArgs, Config, GatewayState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let cli_args = CliArgs::parse();

    // Load config with precedence: CLI > env > file > defaults
    let config = Config::load(&cli_args)?;

    // Initialize tracing with configured log level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("aidgate starting");
    tracing::info!(upstream_url = %config.upstream_url, "upstream data store");
    if !config.denied_cidrs.is_empty() {
        tracing::info!(ranges = config.denied_cidrs.len(), "static geofence ranges loaded");
    }

    let state = Arc::new(GatewayState::from_config(&config)?);
    let app = build_router(state);

    tracing::info!(bind_addr = %config.bind_addr, "aidgate listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
