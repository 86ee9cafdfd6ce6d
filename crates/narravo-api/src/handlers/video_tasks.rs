//! Video task endpoints.

use axum::extract::{Path, State};
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use narravo_models::{
    ApiKeyId, ChapterId, ChapterStatus, GenerationSettings, ProjectId, VideoTask, VideoTaskId,
};
use narravo_queue::{ScheduledTask, TaskPayload};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Video synthesis runs much longer than the default task budget.
const VIDEO_SOFT_DEADLINE_SECS: u64 = 480;
const VIDEO_HARD_DEADLINE_SECS: u64 = 600;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateVideoTaskRequest {
    pub project_id: ProjectId,
    pub chapter_id: ChapterId,
    #[serde(default)]
    pub api_key_id: Option<ApiKeyId>,
    #[serde(default)]
    pub background_id: Option<String>,
    #[serde(default)]
    pub generation_settings: Option<GenerationSettings>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VideoTaskResponse {
    pub success: bool,
    pub message: String,
    pub video_task_id: String,
    /// Scheduler task id for progress subscription.
    pub task_id: String,
}

/// Create a video task for a prepared chapter and enqueue its run.
pub async fn create_video_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<CreateVideoTaskRequest>,
) -> ApiResult<Json<VideoTaskResponse>> {
    let project = state.catalog.get_project(&request.project_id).await?;
    if project.owner_id != user_id {
        return Err(ApiError::not_found(format!("project {}", request.project_id)));
    }

    let chapter = state.catalog.get_chapter(&request.chapter_id).await?;
    if chapter.project_id != request.project_id {
        return Err(ApiError::validation("chapter does not belong to project"));
    }
    if chapter.status != ChapterStatus::MaterialsPrepared {
        return Err(ApiError::business_rule(format!(
            "chapter must have materials prepared, status is {}",
            chapter.status
        )));
    }

    if let Some(ref api_key_id) = request.api_key_id {
        state.catalog.get_api_key(api_key_id, &user_id).await?;
    }

    let video_task = VideoTask::new(
        user_id,
        request.project_id,
        request.chapter_id,
        request.api_key_id,
        request.background_id,
        request.generation_settings.unwrap_or_default(),
    );
    state.catalog.insert_video_task(&video_task).await?;

    let task = ScheduledTask::new(TaskPayload::SynthesizeVideo {
        video_task_id: video_task.id.clone(),
    })
    .with_deadlines(VIDEO_SOFT_DEADLINE_SECS, VIDEO_HARD_DEADLINE_SECS);
    state.queue.enqueue(&task).await?;

    info!(video_task = %video_task.id, task = %task.id, "video task enqueued");
    Ok(Json(VideoTaskResponse {
        success: true,
        message: "video task submitted".into(),
        video_task_id: video_task.id.to_string(),
        task_id: task.id.to_string(),
    }))
}

/// Reset a failed video task (checkpoint preserved) and re-enqueue it.
pub async fn retry_video_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(video_task_id): Path<String>,
) -> ApiResult<Json<VideoTaskResponse>> {
    let id = VideoTaskId::from_string(video_task_id);
    let row = state.catalog.get_video_task(&id).await?;
    if row.user_id != user_id {
        return Err(ApiError::not_found(format!("video task {id}")));
    }

    state.catalog.reset_video_task_for_retry(&id).await?;

    let task = ScheduledTask::new(TaskPayload::SynthesizeVideo {
        video_task_id: id.clone(),
    })
    .with_deadlines(VIDEO_SOFT_DEADLINE_SECS, VIDEO_HARD_DEADLINE_SECS);
    state.queue.enqueue(&task).await?;

    info!(video_task = %id, task = %task.id, "video task retry enqueued");
    Ok(Json(VideoTaskResponse {
        success: true,
        message: "video task retry submitted".into(),
        video_task_id: id.to_string(),
        task_id: task.id.to_string(),
    }))
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VideoTaskStatusResponse {
    pub video_task_id: String,
    pub status: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_sentence_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sentences: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Read a video task's state.
pub async fn get_video_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(video_task_id): Path<String>,
) -> ApiResult<Json<VideoTaskStatusResponse>> {
    let id = VideoTaskId::from_string(video_task_id);
    let row = state.catalog.get_video_task(&id).await?;
    if row.user_id != user_id {
        return Err(ApiError::not_found(format!("video task {id}")));
    }

    Ok(Json(VideoTaskStatusResponse {
        video_task_id: row.id.to_string(),
        status: row.status.as_str().to_string(),
        progress: row.progress,
        current_sentence_index: row.current_sentence_index,
        total_sentences: row.total_sentences,
        video_key: row.video_key,
        video_duration: row.video_duration,
        error_message: row.error_message,
    }))
}
