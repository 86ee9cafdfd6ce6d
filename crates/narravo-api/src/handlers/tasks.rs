//! Scheduler task status endpoint.

use axum::extract::{Path, State};
use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;

use narravo_models::TaskId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, JsonSchema)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Read the latest recorded state of a scheduler task.
///
/// Task state is reconstructed from the progress history; a task with no
/// recorded events yet reports as `queued`.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatusResponse>> {
    if task_id.trim().is_empty() {
        return Err(ApiError::validation("task_id must not be empty"));
    }
    let id = TaskId::from_string(task_id);

    let history = state
        .progress
        .history_since(&id, 0)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let Some(latest) = history.last() else {
        return Ok(Json(TaskStatusResponse {
            task_id: id.to_string(),
            status: "queued".into(),
            progress: None,
            result: None,
        }));
    };

    Ok(Json(TaskStatusResponse {
        task_id: id.to_string(),
        status: latest.status.clone().unwrap_or_else(|| "running".into()),
        progress: latest.progress,
        result: latest.details.clone(),
    }))
}
