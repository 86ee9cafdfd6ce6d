//! Image generation endpoint.

use axum::extract::State;
use axum::Json;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use narravo_models::{ApiKeyId, SentenceId};
use narravo_queue::{ScheduledTask, TaskPayload};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::EnqueueResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateImagesRequest {
    pub sentences_ids: Vec<SentenceId>,
    pub api_key_id: ApiKeyId,
    #[serde(default)]
    pub model: Option<String>,
}

/// Enqueue image generation. Every listed sentence must already carry an
/// image prompt.
pub async fn generate_images(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<GenerateImagesRequest>,
) -> ApiResult<Json<EnqueueResponse>> {
    if request.sentences_ids.is_empty() {
        return Err(ApiError::validation("sentences_ids must not be empty"));
    }
    state
        .catalog
        .get_api_key(&request.api_key_id, &user_id)
        .await?;

    for id in &request.sentences_ids {
        let sentence = state.catalog.get_sentence(id).await?;
        if sentence.image_prompt.is_none() {
            return Err(ApiError::validation(format!(
                "sentence {id} has no image prompt"
            )));
        }
    }

    let task = ScheduledTask::new(TaskPayload::GenerateImages {
        sentence_ids: request.sentences_ids,
        api_key_id: request.api_key_id,
        model: request.model,
    });
    state.queue.enqueue(&task).await?;

    info!(task = %task.id, "image generation enqueued");
    Ok(Json(EnqueueResponse::accepted(
        "image generation task submitted",
        task.id.as_str(),
    )))
}
