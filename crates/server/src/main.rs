use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use reprocess_core::service::LocalStatusService;
use reprocess_core::status::SqliteStatusStore;
use reprocess_core::Component;
use reprocess_server::api::create_router;
use reprocess_server::bootstrap::{self, CommonArgs, LogTarget};
use reprocess_server::state::AppState;

/// Status service: durable order and scene state over HTTP+JSON.
#[derive(Debug, Parser)]
#[command(name = "reprocess-status", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    bootstrap::init_logging(cli.common.log_format(), LogTarget::Stdout, "info,tower_http=debug");

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = bootstrap::load(&cli.common, Component::StatusService)?;
    info!("Database path: {:?}", config.database.path);

    let store = SqliteStatusStore::new(&config.database.path)
        .context("Failed to open status store")?;
    let service = Arc::new(LocalStatusService::new(
        Arc::new(store),
        config.retention.clone(),
    ));
    service
        .seed_settings(&config.settings)
        .context("Failed to seed configuration settings")?;
    info!(
        retention_days = config.retention.days,
        stale_processing_hours = config.retention.stale_processing_hours,
        "Status store initialized"
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, service));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(bootstrap::shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
