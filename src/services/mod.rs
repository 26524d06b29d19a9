//! Pipeline services
//!
//! Parsing, recognition, matching, classification and materialization,
//! orchestrated by the task coordinator.

pub mod ai_client;
pub mod classifier;
pub mod coordinator;
pub mod customer_matcher;
pub mod error_sink;
pub mod materializer;
pub mod order_numbers;
pub mod product_matcher;
pub mod recognizer;
pub mod row_parser;
pub mod similarity;
