//! Error record persistence and operator remediation

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ErrorLevel, ErrorRecord, ErrorStatus, ErrorType};

/// Insert a new error record in PENDING state, returning its id
#[allow(clippy::too_many_arguments)]
pub async fn insert_error(
    pool: &SqlitePool,
    task_id: Uuid,
    row_number: u32,
    raw_data: &serde_json::Value,
    error_type: ErrorType,
    level: ErrorLevel,
    message: &str,
    suggested_action: &str,
) -> Result<i64> {
    let raw = serde_json::to_string(raw_data)
        .map_err(|e| Error::Internal(format!("Failed to serialize raw row: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO error_records (
            task_id, row_number, raw_data, error_type, level,
            message, suggested_action, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)
        "#,
    )
    .bind(task_id.to_string())
    .bind(row_number as i64)
    .bind(raw)
    .bind(error_type.as_str())
    .bind(level.as_str())
    .bind(message)
    .bind(suggested_action)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Error records for a task, optionally filtered by review state
pub async fn list_errors(
    pool: &SqlitePool,
    task_id: Uuid,
    status: Option<ErrorStatus>,
) -> Result<Vec<ErrorRecord>> {
    let rows = match status {
        Some(s) => {
            sqlx::query(
                r#"
                SELECT id, task_id, row_number, raw_data, error_type, level,
                       message, suggested_action, status, resolved_by, resolved_at, created_at
                FROM error_records
                WHERE task_id = ? AND status = ?
                ORDER BY row_number
                "#,
            )
            .bind(task_id.to_string())
            .bind(s.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, task_id, row_number, raw_data, error_type, level,
                       message, suggested_action, status, resolved_by, resolved_at, created_at
                FROM error_records
                WHERE task_id = ?
                ORDER BY row_number
                "#,
            )
            .bind(task_id.to_string())
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(error_from_row).collect()
}

fn error_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ErrorRecord> {
    let task_id: String = row.get("task_id");
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|e| Error::Internal(format!("Invalid task_id in database: {}", e)))?;

    let raw_data: String = row.get("raw_data");
    let raw_data: serde_json::Value = serde_json::from_str(&raw_data)
        .map_err(|e| Error::Internal(format!("Failed to deserialize raw row: {}", e)))?;

    let error_type: String = row.get("error_type");
    let error_type = parse_error_type(&error_type)?;

    let level: String = row.get("level");
    let level = match level.as_str() {
        "WARNING" => ErrorLevel::Warning,
        _ => ErrorLevel::Error,
    };

    let status: String = row.get("status");
    let status = parse_error_status(&status)?;

    let resolved_at: Option<String> = row.get("resolved_at");
    let resolved_at = resolved_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
        })
        .transpose()?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?;

    Ok(ErrorRecord {
        id: row.get("id"),
        task_id,
        row_number: row.get::<i64, _>("row_number") as u32,
        raw_data,
        error_type,
        level,
        message: row.get("message"),
        suggested_action: row.get("suggested_action"),
        status,
        resolved_by: row.get("resolved_by"),
        resolved_at,
        created_at,
    })
}

fn parse_error_type(s: &str) -> Result<ErrorType> {
    match s {
        "PARSE_ERROR" => Ok(ErrorType::ParseError),
        "VALIDATION_ERROR" => Ok(ErrorType::ValidationError),
        "PRODUCT_NOT_FOUND" => Ok(ErrorType::ProductNotFound),
        "CUSTOMER_NOT_FOUND" => Ok(ErrorType::CustomerNotFound),
        "MATERIALIZATION_ERROR" => Ok(ErrorType::MaterializationError),
        "TASK_ERROR" => Ok(ErrorType::TaskError),
        other => Err(Error::Internal(format!("Unknown error type: {}", other))),
    }
}

fn parse_error_status(s: &str) -> Result<ErrorStatus> {
    match s {
        "PENDING" => Ok(ErrorStatus::Pending),
        "PROCESSED" => Ok(ErrorStatus::Processed),
        "IGNORED" => Ok(ErrorStatus::Ignored),
        other => Err(Error::Internal(format!("Unknown error status: {}", other))),
    }
}

/// Move a PENDING record to PROCESSED or IGNORED with operator audit.
/// Returns false if the record does not exist or is already resolved.
pub async fn resolve_error(
    pool: &SqlitePool,
    error_id: i64,
    new_status: ErrorStatus,
    operator: &str,
) -> Result<bool> {
    if new_status == ErrorStatus::Pending {
        return Err(Error::InvalidInput("Cannot resolve back to PENDING".into()));
    }

    let result = sqlx::query(
        r#"
        UPDATE error_records
        SET status = ?, resolved_by = ?, resolved_at = ?
        WHERE id = ? AND status = 'PENDING'
        "#,
    )
    .bind(new_status.as_str())
    .bind(operator)
    .bind(Utc::now().to_rfc3339())
    .bind(error_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
