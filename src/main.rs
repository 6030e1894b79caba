//! bikeshare-tracker server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use bikeshare_tracker::api;
use bikeshare_tracker::app_state::AppState;
use bikeshare_tracker::config::{LogFormat, TrackerConfig};
use bikeshare_tracker::domain::EventBus;
use bikeshare_tracker::persistence::{MemoryStore, PostgresStore, StationStore};
use bikeshare_tracker::service::{ReconcileService, spawn_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = TrackerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting bikeshare-tracker");

    // Build persistence layer
    let store: Arc<dyn StationStore> = if config.persistence_enabled {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .context("could not connect to the database")?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("could not apply migrations")?;
        tracing::info!("postgres store ready");
        Arc::new(PostgresStore::new(pool))
    } else {
        tracing::warn!("persistence disabled, history is kept in memory only");
        Arc::new(MemoryStore::new())
    };

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let service = Arc::new(ReconcileService::new(
        store,
        event_bus,
        config.pass_options(),
    ));

    let _sweeper = spawn_sweeper(
        Arc::clone(&service),
        Duration::from_secs(config.stale_sweep_interval_secs),
        Duration::from_secs(config.stale_update_after_secs),
    );

    // Build router
    let app = api::build_app(AppState::new(service));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("could not bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
