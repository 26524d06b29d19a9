//! Error record endpoints
//!
//! Operators list a task's error records and mark them processed or
//! ignored; both transitions record who acted and when.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::errors as error_db;
use crate::error::{ApiError, ApiResult};
use crate::models::{ErrorRecord, ErrorStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ErrorListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorListResponse {
    pub errors: Vec<ErrorRecord>,
    pub total: usize,
}

/// GET /api/tasks/:id/errors
pub async fn list_task_errors(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<ErrorListQuery>,
) -> ApiResult<Json<ErrorListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| match s {
            "PENDING" => Ok(ErrorStatus::Pending),
            "PROCESSED" => Ok(ErrorStatus::Processed),
            "IGNORED" => Ok(ErrorStatus::Ignored),
            other => Err(ApiError::BadRequest(format!("Unknown status: {}", other))),
        })
        .transpose()?;

    let errors = error_db::list_errors(state.coordinator.pool(), task_id, status).await?;
    let total = errors.len();
    Ok(Json(ErrorListResponse { errors, total }))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub operator: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub error_id: i64,
    pub status: String,
}

async fn transition(
    state: &AppState,
    error_id: i64,
    new_status: ErrorStatus,
    operator: &str,
) -> ApiResult<Json<ResolveResponse>> {
    if operator.trim().is_empty() {
        return Err(ApiError::BadRequest("operator is required".into()));
    }
    let updated =
        error_db::resolve_error(state.coordinator.pool(), error_id, new_status, operator).await?;
    if !updated {
        return Err(ApiError::Conflict(format!(
            "Error record {} is not pending",
            error_id
        )));
    }
    Ok(Json(ResolveResponse {
        error_id,
        status: new_status.as_str().to_string(),
    }))
}

/// POST /api/errors/:id/resolve
pub async fn resolve_error(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    transition(&state, error_id, ErrorStatus::Processed, &request.operator).await
}

/// POST /api/errors/:id/ignore
pub async fn ignore_error(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    transition(&state, error_id, ErrorStatus::Ignored, &request.operator).await
}

pub fn error_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks/:task_id/errors", get(list_task_errors))
        .route("/api/errors/:error_id/resolve", post(resolve_error))
        .route("/api/errors/:error_id/ignore", post(ignore_error))
}
