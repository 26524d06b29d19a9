//! Per-row processing results
//!
//! Append-only: the pipeline writes each row's outcome exactly once.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{MatchResult, ProcessedRow, RecognizedFields};

/// Persist one processed row; `order_number` set only for materialized rows
pub async fn insert_row_result(
    pool: &SqlitePool,
    task_id: Uuid,
    row: &ProcessedRow,
    order_number: Option<&str>,
) -> Result<()> {
    let fields = serde_json::to_string(&row.fields)
        .map_err(|e| Error::Internal(format!("Failed to serialize fields: {}", e)))?;
    let product_match = row
        .product_match
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize product match: {}", e)))?;
    let customer_match = row
        .customer_match
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize customer match: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO task_rows (
            task_id, row_number, outcome, confidence,
            fields, product_match, customer_match,
            error_message, order_number, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(task_id.to_string())
    .bind(row.row_number as i64)
    .bind(row.outcome.as_str())
    .bind(row.confidence)
    .bind(fields)
    .bind(product_match)
    .bind(customer_match)
    .bind(&row.error_message)
    .bind(order_number)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Row detail returned by the task result endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RowDetail {
    pub row_number: u32,
    pub outcome: String,
    pub confidence: f64,
    pub fields: RecognizedFields,
    pub product_match: Option<MatchResult>,
    pub customer_match: Option<MatchResult>,
    pub error_message: Option<String>,
    pub order_number: Option<String>,
}

/// All processed rows of one task, ordered by row number
pub async fn list_row_results(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<RowDetail>> {
    let rows = sqlx::query(
        r#"
        SELECT row_number, outcome, confidence, fields,
               product_match, customer_match, error_message, order_number
        FROM task_rows
        WHERE task_id = ?
        ORDER BY row_number
        "#,
    )
    .bind(task_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let fields: String = row.get("fields");
            let fields: RecognizedFields = serde_json::from_str(&fields)
                .map_err(|e| Error::Internal(format!("Failed to deserialize fields: {}", e)))?;
            Ok(RowDetail {
                row_number: row.get::<i64, _>("row_number") as u32,
                outcome: row.get("outcome"),
                confidence: row.get("confidence"),
                fields,
                product_match: match_from_column(row.get("product_match"))?,
                customer_match: match_from_column(row.get("customer_match"))?,
                error_message: row.get("error_message"),
                order_number: row.get("order_number"),
            })
        })
        .collect()
}

fn match_from_column(json: Option<String>) -> Result<Option<MatchResult>> {
    json.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize match: {}", e)))
}
