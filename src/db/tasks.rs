//! Ingestion task persistence

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{IngestionTask, TaskStatus};

/// Insert or update a task
pub async fn save_task(pool: &SqlitePool, task: &IngestionTask) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ingest_tasks (
            task_id, file_name, file_size, file_hash, operator, channel,
            status, error_message, min_confidence,
            total_rows, processed_rows, success_rows, failed_rows, manual_rows,
            created_at, started_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            status = excluded.status,
            error_message = excluded.error_message,
            total_rows = excluded.total_rows,
            processed_rows = excluded.processed_rows,
            success_rows = excluded.success_rows,
            failed_rows = excluded.failed_rows,
            manual_rows = excluded.manual_rows,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at
        "#,
    )
    .bind(task.task_id.to_string())
    .bind(&task.file_name)
    .bind(task.file_size)
    .bind(&task.file_hash)
    .bind(&task.operator)
    .bind(&task.channel)
    .bind(task.status.as_str())
    .bind(&task.error_message)
    .bind(task.min_confidence)
    .bind(task.total_rows)
    .bind(task.processed_rows)
    .bind(task.success_rows)
    .bind(task.failed_rows)
    .bind(task.manual_rows)
    .bind(task.created_at.to_rfc3339())
    .bind(task.started_at.map(|dt| dt.to_rfc3339()))
    .bind(task.completed_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a task by id; soft-deleted tasks are invisible
pub async fn load_task(pool: &SqlitePool, task_id: Uuid) -> Result<Option<IngestionTask>> {
    let row = sqlx::query(
        r#"
        SELECT task_id, file_name, file_size, file_hash, operator, channel,
               status, error_message, min_confidence,
               total_rows, processed_rows, success_rows, failed_rows, manual_rows,
               created_at, started_at, completed_at
        FROM ingest_tasks
        WHERE task_id = ? AND deleted = 0
        "#,
    )
    .bind(task_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(task_from_row(&row)?)),
        None => Ok(None),
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<IngestionTask> {
    let task_id: String = row.get("task_id");
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|e| Error::Internal(format!("Invalid task_id in database: {}", e)))?;

    let status: String = row.get("status");
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown task status: {}", status)))?;

    Ok(IngestionTask {
        task_id,
        file_name: row.get("file_name"),
        file_size: row.get("file_size"),
        file_hash: row.get("file_hash"),
        operator: row.get("operator"),
        channel: row.get("channel"),
        status,
        error_message: row.get("error_message"),
        min_confidence: row.get("min_confidence"),
        total_rows: row.get("total_rows"),
        processed_rows: row.get("processed_rows"),
        success_rows: row.get("success_rows"),
        failed_rows: row.get("failed_rows"),
        manual_rows: row.get("manual_rows"),
        created_at: parse_timestamp(row.get("created_at"))?,
        started_at: parse_optional_timestamp(row.get("started_at"))?,
        completed_at: parse_optional_timestamp(row.get("completed_at"))?,
    })
}

fn parse_timestamp(s: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_timestamp).transpose()
}

/// Update only the row counters and status; used by the coordinator
/// while the pipeline runs so progress survives a restart.
pub async fn update_task_counters(pool: &SqlitePool, task: &IngestionTask) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE ingest_tasks SET
            status = ?, error_message = ?,
            total_rows = ?, processed_rows = ?,
            success_rows = ?, failed_rows = ?, manual_rows = ?,
            started_at = ?, completed_at = ?
        WHERE task_id = ?
        "#,
    )
    .bind(task.status.as_str())
    .bind(&task.error_message)
    .bind(task.total_rows)
    .bind(task.processed_rows)
    .bind(task.success_rows)
    .bind(task.failed_rows)
    .bind(task.manual_rows)
    .bind(task.started_at.map(|dt| dt.to_rfc3339()))
    .bind(task.completed_at.map(|dt| dt.to_rfc3339()))
    .bind(task.task_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Soft-delete a task; rows and error records are kept for audit
pub async fn soft_delete_task(pool: &SqlitePool, task_id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE ingest_tasks SET deleted = 1 WHERE task_id = ? AND deleted = 0")
        .bind(task_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Newest-first task page
pub async fn list_tasks(
    pool: &SqlitePool,
    page: u32,
    page_size: u32,
    status: Option<TaskStatus>,
) -> Result<(Vec<IngestionTask>, u64)> {
    let page_size = page_size.clamp(1, 200);
    // i64 arithmetic: page numbers near u32::MAX must not overflow
    let offset = (i64::from(page.max(1)) - 1) * i64::from(page_size);

    let total: i64 = match status {
        Some(s) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM ingest_tasks WHERE deleted = 0 AND status = ?")
                .bind(s.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM ingest_tasks WHERE deleted = 0")
                .fetch_one(pool)
                .await?
        }
    };

    let rows = match status {
        Some(s) => {
            sqlx::query(
                r#"
                SELECT task_id, file_name, file_size, file_hash, operator, channel,
                       status, error_message, min_confidence,
                       total_rows, processed_rows, success_rows, failed_rows, manual_rows,
                       created_at, started_at, completed_at
                FROM ingest_tasks
                WHERE deleted = 0 AND status = ?
                ORDER BY created_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(s.as_str())
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT task_id, file_name, file_size, file_hash, operator, channel,
                       status, error_message, min_confidence,
                       total_rows, processed_rows, success_rows, failed_rows, manual_rows,
                       created_at, started_at, completed_at
                FROM ingest_tasks
                WHERE deleted = 0
                ORDER BY created_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    let tasks = rows
        .iter()
        .map(task_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok((tasks, total as u64))
}

/// Aggregate counters across all (non-deleted) tasks
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatistics {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_rows: u64,
    pub success_rows: u64,
    pub failed_rows: u64,
    pub manual_rows: u64,
}

pub async fn task_statistics(pool: &SqlitePool) -> Result<TaskStatistics> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_tasks,
               COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0) AS completed_tasks,
               COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0) AS failed_tasks,
               COALESCE(SUM(total_rows), 0) AS total_rows,
               COALESCE(SUM(success_rows), 0) AS success_rows,
               COALESCE(SUM(failed_rows), 0) AS failed_rows,
               COALESCE(SUM(manual_rows), 0) AS manual_rows
        FROM ingest_tasks
        WHERE deleted = 0
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(TaskStatistics {
        total_tasks: row.get::<i64, _>("total_tasks") as u64,
        completed_tasks: row.get::<i64, _>("completed_tasks") as u64,
        failed_tasks: row.get::<i64, _>("failed_tasks") as u64,
        total_rows: row.get::<i64, _>("total_rows") as u64,
        success_rows: row.get::<i64, _>("success_rows") as u64,
        failed_rows: row.get::<i64, _>("failed_rows") as u64,
        manual_rows: row.get::<i64, _>("manual_rows") as u64,
    })
}
