//! orderflow library interface
//!
//! Spreadsheet-to-order ingestion service: uploads are parsed,
//! recognized, matched against the product catalog and customer store,
//! classified, and materialized into draft orders. Exposed as a library
//! for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, Error, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::ServiceConfig;
use crate::services::coordinator::TaskCoordinator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: TaskCoordinator,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServiceConfig) -> Self {
        Self {
            coordinator: TaskCoordinator::new(pool, config),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::task_routes())
        .merge(api::error_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
