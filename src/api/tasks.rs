//! Ingestion task endpoints
//!
//! Upload returns 202 immediately; progress and results are polled.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::rows::{self, RowDetail};
use crate::db::tasks::{self, TaskStatistics};
use crate::db::orders;
use crate::error::{ApiError, ApiResult};
use crate::models::{IngestionTask, TaskProgress, TaskStatus};
use crate::AppState;

const DEFAULT_CHANNEL: &str = "SPREADSHEET_IMPORT";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub task_id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub operator: String,
    pub channel: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub min_confidence: f64,
    pub progress: TaskProgress,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

fn task_view(task: IngestionTask, progress: TaskProgress) -> TaskView {
    TaskView {
        task_id: task.task_id,
        file_name: task.file_name,
        file_size: task.file_size,
        operator: task.operator,
        channel: task.channel,
        status: task.status.as_str().to_string(),
        error_message: task.error_message,
        min_confidence: task.min_confidence,
        progress,
        created_at: task.created_at.to_rfc3339(),
        started_at: task.started_at.map(|dt| dt.to_rfc3339()),
        completed_at: task.completed_at.map(|dt| dt.to_rfc3339()),
    }
}

/// POST /api/tasks
///
/// Multipart upload: `file` (required), `operator`, `channel`,
/// `minConfidence` as text parts.
pub async fn submit_task(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut operator = "system".to_string();
    let mut channel = DEFAULT_CHANNEL.to_string();
    let mut min_confidence: Option<f64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let name = field
                    .file_name()
                    .unwrap_or("upload.csv")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((name, bytes.to_vec()));
            }
            "operator" => {
                operator = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad operator field: {}", e)))?;
            }
            "channel" => {
                channel = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad channel field: {}", e)))?;
            }
            "minConfidence" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad minConfidence field: {}", e)))?;
                min_confidence = Some(text.trim().parse().map_err(|_| {
                    ApiError::BadRequest(format!("minConfidence is not a number: {}", text))
                })?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' part".into()))?;

    let task = state
        .coordinator
        .submit(bytes, file_name, operator, channel, min_confidence)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: task.task_id,
            status: task.status.as_str().to_string(),
        }),
    ))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskView>> {
    let (task, progress) = state.coordinator.progress(task_id).await?;
    Ok(Json(task_view(task, progress)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultResponse {
    pub task: TaskView,
    pub rows: Vec<RowDetail>,
    pub order_numbers: Vec<String>,
}

/// GET /api/tasks/:id/result
///
/// Full per-row breakdown; available at any time, complete once the
/// task is terminal.
pub async fn get_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResultResponse>> {
    let (task, progress) = state.coordinator.progress(task_id).await?;
    let rows = rows::list_row_results(state.coordinator.pool(), task_id).await?;
    let order_numbers = orders::order_numbers_for_task(state.coordinator.pool(), task_id).await?;
    Ok(Json(TaskResultResponse {
        task: task_view(task, progress),
        rows,
        order_numbers,
    }))
}

/// POST /api/tasks/:id/cancel
///
/// Cancelling a terminal task is a conflict; rows already in flight
/// still finish.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<SubmitResponse>> {
    let task = state.coordinator.cancel(task_id).await?;
    if task.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Task is already {}",
            task.status.as_str()
        )));
    }
    Ok(Json(SubmitResponse {
        task_id: task.task_id,
        status: task.status.as_str().to_string(),
    }))
}

/// DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = tasks::soft_delete_task(state.coordinator.pool(), task_id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Task {}", task_id)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub status: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            TaskStatus::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {}", s)))
        })
        .transpose()?;

    let (tasks, total) = tasks::list_tasks(
        state.coordinator.pool(),
        query.page,
        query.page_size,
        status,
    )
    .await?;

    let tasks = tasks
        .into_iter()
        .map(|task| {
            let progress = TaskProgress {
                total: task.total_rows as u64,
                processed: task.processed_rows as u64,
                success: task.success_rows as u64,
                failed: task.failed_rows as u64,
                manual: task.manual_rows as u64,
                percentage: TaskProgress::percentage_of(
                    task.processed_rows as u64,
                    task.total_rows as u64,
                ),
            };
            task_view(task, progress)
        })
        .collect();

    Ok(Json(TaskListResponse {
        tasks,
        page: query.page,
        page_size: query.page_size,
        total,
    }))
}

/// GET /api/tasks/statistics
pub async fn get_statistics(State(state): State<AppState>) -> ApiResult<Json<TaskStatistics>> {
    let stats = tasks::task_statistics(state.coordinator.pool()).await?;
    Ok(Json(stats))
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", post(submit_task).get(list_tasks))
        .route("/api/tasks/statistics", get(get_statistics))
        .route("/api/tasks/:task_id", get(get_task).delete(delete_task))
        .route("/api/tasks/:task_id/result", get(get_task_result))
        .route("/api/tasks/:task_id/cancel", post(cancel_task))
}
