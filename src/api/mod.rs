//! HTTP API handlers

pub mod errors;
pub mod health;
pub mod tasks;

pub use errors::error_routes;
pub use health::health_routes;
pub use tasks::task_routes;
