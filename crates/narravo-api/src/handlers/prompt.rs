//! Prompt generation endpoints.

use axum::extract::State;
use axum::Json;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use narravo_models::{ApiKeyId, ChapterId, ChapterStatus, SentenceId};
use narravo_queue::{ScheduledTask, TaskPayload};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::EnqueueResponse;
use crate::state::AppState;

fn default_style() -> String {
    "comic".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GeneratePromptsRequest {
    pub chapter_id: ChapterId,
    pub api_key_id: ApiKeyId,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Enqueue prompt generation for every sentence of a chapter.
///
/// The chapter must be confirmed; it transitions to `generating_prompts`
/// as part of accepting the request.
pub async fn generate_prompts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<GeneratePromptsRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    let chapter = state.catalog.get_chapter(&request.chapter_id).await?;
    if chapter.status != ChapterStatus::Confirmed {
        return Err(ApiError::business_rule(format!(
            "chapter must be confirmed, status is {}",
            chapter.status
        )));
    }

    // Ownership: the chapter's project must belong to the caller, and so
    // must the API key.
    let project = state.catalog.get_project(&chapter.project_id).await?;
    if project.owner_id != user_id {
        return Err(ApiError::not_found(format!("chapter {}", request.chapter_id)));
    }
    state
        .catalog
        .get_api_key(&request.api_key_id, &user_id)
        .await?;

    let task = ScheduledTask::new(TaskPayload::GeneratePrompts {
        chapter_id: request.chapter_id.clone(),
        api_key_id: request.api_key_id,
        style: request.style,
        model: request.model,
    });
    state.queue.enqueue(&task).await?;

    state
        .catalog
        .advance_chapter_status(&request.chapter_id, ChapterStatus::GeneratingPrompts)
        .await?;

    info!(chapter = %request.chapter_id, task = %task.id, "prompt generation enqueued");
    Ok(Json(EnqueueResponse::accepted(
        "prompt generation task submitted",
        task.id.as_str(),
    )))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GeneratePromptsByIdsRequest {
    pub sentence_ids: Vec<SentenceId>,
    pub api_key_id: ApiKeyId,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Enqueue prompt generation for an explicit sentence subset.
pub async fn generate_prompts_by_ids(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<GeneratePromptsByIdsRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    if request.sentence_ids.is_empty() {
        return Err(ApiError::validation("sentence_ids must not be empty"));
    }
    state
        .catalog
        .get_api_key(&request.api_key_id, &user_id)
        .await?;

    let task = ScheduledTask::new(TaskPayload::GeneratePromptsByIds {
        sentence_ids: request.sentence_ids,
        api_key_id: request.api_key_id,
        style: request.style,
        model: request.model,
    });
    state.queue.enqueue(&task).await?;

    info!(task = %task.id, "prompt-by-ids generation enqueued");
    Ok(Json(EnqueueResponse::accepted(
        "prompt generation task submitted",
        task.id.as_str(),
    )))
}
