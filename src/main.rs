//! orderflow - spreadsheet order ingestion service
//!
//! Accepts spreadsheet uploads over HTTP, runs the recognition and
//! matching pipeline asynchronously, and materializes accepted rows
//! into draft orders.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use orderflow::config::ServiceConfig;
use orderflow::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting orderflow");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("ORDERFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("orderflow.toml"));
    let config = ServiceConfig::load(Some(&config_path))?;
    info!("AI matching: {}", if config.ai.enabled { "enabled" } else { "disabled" });

    let db_path = Path::new(&config.database_path);
    info!("Database: {}", db_path.display());
    let pool = orderflow::db::init_database_pool(db_path).await?;
    info!("Database connection established");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config);
    let app = orderflow::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
