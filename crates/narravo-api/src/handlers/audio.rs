//! Audio generation endpoint.

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

fn default_voice() -> String {
    "alloy".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateAudioRequest {
    pub sentences_ids: Vec<SentenceId>,
    pub api_key_id: ApiKeyId,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Enqueue voice-over synthesis for the listed sentences.
pub async fn generate_audio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<GenerateAudioRequest>,
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
        if sentence.effective_content().trim().is_empty() {
            return Err(ApiError::validation(format!("sentence {id} has no content")));
        }
    }

    let task = ScheduledTask::new(TaskPayload::GenerateAudio {
        sentence_ids: request.sentences_ids,
        api_key_id: request.api_key_id,
        voice: request.voice,
        model: request.model,
    });
    state.queue.enqueue(&task).await?;

    info!(task = %task.id, "audio generation enqueued");
    Ok(Json(EnqueueResponse::accepted(
        "audio generation task submitted",
        task.id.as_str(),
    )))
}
