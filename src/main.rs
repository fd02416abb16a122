//! # repo-sync service entry point

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use repo_sync::{
    config::ConfigLoader,
    db,
    server::{AppState, run_server},
    sweeper::SyncSweeper,
    telemetry,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;
    info!("Database migrations applied");

    let config = Arc::new(config);
    let state = AppState::from_config(Arc::clone(&config), Arc::new(db))?;

    let shutdown = CancellationToken::new();
    let sweeper = if config.sweeper.enabled {
        let sweeper = SyncSweeper::new(state.sync_service.clone(), &config.sweeper);
        Some(tokio::spawn(sweeper.run(shutdown.child_token())))
    } else {
        None
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let served = run_server(state, shutdown.clone()).await;
    shutdown.cancel();
    if let Some(handle) = sweeper
        && let Err(err) = handle.await
    {
        error!(error = %err, "Sync sweeper task panicked");
    }

    served
}
