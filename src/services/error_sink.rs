//! Error record creation
//!
//! Every non-SUCCESS row leaves a durable trace with enough raw context
//! for an operator to remediate it later.

use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::errors;
use crate::error::Result;
use crate::models::{ErrorLevel, ErrorType, ProcessedRow, RawRow, RowOutcome};

/// Classify the error type for a non-SUCCESS processed row
fn error_type_for(row: &ProcessedRow) -> ErrorType {
    let message = row.error_message.as_deref().unwrap_or("");
    if message.starts_with("Missing mandatory fields") {
        return ErrorType::ValidationError;
    }
    match &row.product_match {
        Some(m) if !m.matched => ErrorType::ProductNotFound,
        _ => match &row.customer_match {
            Some(m) if !m.matched => ErrorType::CustomerNotFound,
            _ => ErrorType::ValidationError,
        },
    }
}

fn raw_row_json(raw: &RawRow) -> serde_json::Value {
    json!({
        "row_number": raw.row_number,
        "cells": raw
            .labeled_values()
            .map(|(h, v)| json!({"header": h, "value": v}))
            .collect::<Vec<_>>(),
    })
}

/// Record a FAILED or MANUAL_PROCESS row
pub async fn record_row(
    pool: &SqlitePool,
    task_id: Uuid,
    raw: &RawRow,
    processed: &ProcessedRow,
) -> Result<()> {
    debug_assert_ne!(processed.outcome, RowOutcome::Success);

    let error_type = error_type_for(processed);
    let level = if processed.outcome == RowOutcome::ManualProcess {
        ErrorLevel::Warning
    } else {
        ErrorLevel::Error
    };
    let message = processed
        .error_message
        .clone()
        .unwrap_or_else(|| "Row not auto-accepted".to_string());
    let suggestion = processed
        .product_match
        .as_ref()
        .and_then(|m| m.suggestion.clone())
        .or_else(|| {
            processed
                .customer_match
                .as_ref()
                .and_then(|m| m.suggestion.clone())
        })
        .unwrap_or_else(|| "Review the row and correct the highlighted fields".to_string());

    errors::insert_error(
        pool,
        task_id,
        processed.row_number,
        &raw_row_json(raw),
        error_type,
        level,
        &message,
        &suggestion,
    )
    .await?;

    Ok(())
}

/// Record a row the parser could not read at all
pub async fn record_parse_error(
    pool: &SqlitePool,
    task_id: Uuid,
    row_number: u32,
    message: &str,
) -> Result<()> {
    errors::insert_error(
        pool,
        task_id,
        row_number,
        &json!({"row_number": row_number}),
        ErrorType::ParseError,
        ErrorLevel::Error,
        message,
        "Fix the cell contents and re-upload",
    )
    .await?;
    Ok(())
}

/// Record a SUCCESS row whose order could not be persisted
pub async fn record_materialization_error(
    pool: &SqlitePool,
    task_id: Uuid,
    raw: &RawRow,
    processed: &ProcessedRow,
    message: &str,
) -> Result<()> {
    errors::insert_error(
        pool,
        task_id,
        processed.row_number,
        &raw_row_json(raw),
        ErrorType::MaterializationError,
        ErrorLevel::Error,
        message,
        "Retry the task or create the order manually",
    )
    .await?;
    Ok(())
}

/// Record a whole-file failure (unreadable upload, pipeline panic)
pub async fn record_task_error(pool: &SqlitePool, task_id: Uuid, message: &str) -> Result<()> {
    errors::insert_error(
        pool,
        task_id,
        0,
        &json!({}),
        ErrorType::TaskError,
        ErrorLevel::Error,
        message,
        "Check the file format and re-upload",
    )
    .await?;
    Ok(())
}
