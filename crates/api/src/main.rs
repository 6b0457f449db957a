use std::sync::Arc;

use anyhow::Result;
use domain::services::SystemClock;
use tracing::info;

use wayfarer_api::app::{self, AppState, Stores};
use wayfarer_api::config::{Config, StorageBackend};
use wayfarer_api::middleware;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Wayfarer API v{}", env!("CARGO_PKG_VERSION"));

    let clock = Arc::new(SystemClock);
    let (stores, pool) = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_config = persistence::db::DatabaseConfig::from(&config.database);
            let pool = persistence::db::create_pool(&db_config).await?;

            info!("Running database migrations...");
            persistence::db::run_migrations(&pool).await?;
            info!("Migrations completed");

            (Stores::postgres(pool.clone()), Some(pool))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data will not survive a restart");
            (Stores::memory(clock.clone()), None)
        }
    };

    let addr = config.socket_addr()?;
    let state = AppState::new(config, stores, clock, pool)?;
    let app = app::create_app(state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
