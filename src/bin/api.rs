//! Outreach API Server
//!
//! Run with: cargo run --bin outreach-api
//!
//! # Configuration
//!
//! Read from `OUTREACH_CONFIG` if set, otherwise from the standard locations
//! (`~/.config/outreach/config.toml`, `/etc/outreach/config.toml`,
//! `./outreach.toml`). Environment variables override file values:
//! - `OUTREACH_API_HOST` / `OUTREACH_API_PORT`: Bind address (default: 0.0.0.0:8082)
//! - `OUTREACH_EVENTS_DB`: Event log path
//! - `OUTREACH_BASE_URL`: Public site URL
//! - `OUTREACH_STORAGE_PUBLIC_URL`: Object storage prefix for the image proxy
//! - `OUTREACH_LOG_LEVEL` / `OUTREACH_LOG_FORMAT`: Logging (`RUST_LOG` wins)

use outreach::api::{serve, AppState};
use outreach::{Config, SqliteEventStore};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    config.logging.init();

    tracing::info!("Starting Outreach API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Event log: {}", config.events.database_path);
    tracing::info!("Public site: {}", config.site.base());

    if config.storage.public_url.is_none() {
        tracing::info!("Image proxy disabled (set OUTREACH_STORAGE_PUBLIC_URL to enable)");
    }

    let store = Arc::new(SqliteEventStore::open(Path::new(&config.events.database_path))?);
    tracing::info!(events = store.count()?, "Event log opened");

    let addr = config.api.addr();
    let state = AppState::new(store, config);

    serve(state, &addr).await?;

    tracing::info!("Outreach API server stopped");
    Ok(())
}

/// Explicit `OUTREACH_CONFIG` file, else the default search path
fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    match std::env::var("OUTREACH_CONFIG") {
        Ok(path) if !path.trim().is_empty() => Ok(Config::load_with_env(Path::new(path.trim()))?),
        _ => Ok(Config::load_default()),
    }
}
