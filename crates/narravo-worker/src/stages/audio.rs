//! Audio stage: synthesize each sentence's voice-over.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use narravo_models::{ApiKeyId, ChapterId, SentenceId, UserId};
use narravo_provider::{ProviderGateway, TtsOptions};
use narravo_storage::KeyPurpose;

use crate::error::{WorkerError, WorkerResult};
use crate::stages::{
    advance_prepared_chapters, fan_out, gateway_for_key, load_ancestry, load_sentences,
    record_usage, StageOutcome,
};
use crate::WorkerContext;

const DEFAULT_TTS_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

/// Synthesize voice-overs for the given sentences.
pub async fn run_audio_stage(
    ctx: Arc<WorkerContext>,
    sentence_ids: &[SentenceId],
    api_key_id: &ApiKeyId,
    voice: &str,
    model: Option<String>,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<StageOutcome> {
    let sentences = load_sentences(&ctx, sentence_ids).await?;
    if let Some(empty) = sentences.iter().find(|s| s.effective_content().trim().is_empty()) {
        return Err(WorkerError::validation(format!(
            "sentence {} has no content",
            empty.id
        )));
    }

    let ancestry = load_ancestry(&ctx, &sentences).await?;
    let chapter_ids: Vec<ChapterId> = ancestry.chapters.keys().cloned().collect();
    let owners: std::collections::HashMap<SentenceId, UserId> = sentences
        .iter()
        .filter_map(|s| ancestry.owner_for(s).map(|u| (s.id.clone(), u.clone())))
        .collect();

    let (gateway, key) = gateway_for_key(&ctx, api_key_id, cancel).await?;
    let model = model.unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string());
    let voice = if voice.is_empty() {
        DEFAULT_VOICE.to_string()
    } else {
        voice.to_string()
    };

    info!(sentences = sentences.len(), %model, %voice, "audio stage starting");

    let ctx_for_work = Arc::clone(&ctx);
    let gateway_for_work = gateway.clone();
    let model_for_work = model.clone();
    let voice_for_work = voice.clone();
    let owners = Arc::new(owners);
    let outcome = fan_out(&ctx, sentences, ctx.config.stage_parallel, move |sentence| {
        let ctx = Arc::clone(&ctx_for_work);
        let gateway = gateway_for_work.clone();
        let model = model_for_work.clone();
        let voice = voice_for_work.clone();
        let owners = Arc::clone(&owners);
        synthesize_one(ctx, gateway, model, voice, owners, sentence)
    })
    .await?;

    record_usage(&ctx, &key, outcome.succeeded as u64).await;
    advance_prepared_chapters(&ctx, chapter_ids).await?;

    outcome.into_result()
}

async fn synthesize_one(
    ctx: Arc<WorkerContext>,
    gateway: ProviderGateway,
    model: String,
    default_voice: String,
    owners: Arc<std::collections::HashMap<SentenceId, UserId>>,
    sentence: narravo_models::Sentence,
) -> WorkerResult<()> {
    let owner = owners
        .get(&sentence.id)
        .ok_or_else(|| WorkerError::validation(format!("no owner for sentence {}", sentence.id)))?;

    // Per-sentence voice settings win over the stage default.
    let voice = sentence
        .voice
        .voice_type
        .clone()
        .unwrap_or_else(|| default_voice.clone());
    let opts = TtsOptions {
        speed: Some(sentence.voice.speech_rate),
        format: Some("mp3".to_string()),
    };

    let bytes = gateway
        .tts(sentence.effective_content(), &voice, &model, &opts)
        .await?;

    let key = ctx
        .storage
        .put(owner.as_str(), bytes, KeyPurpose::Audio, "mp3")
        .await?;

    ctx.catalog
        .update_sentence(&sentence.id, |s| {
            s.set_audio_key(key.clone());
            Ok(())
        })
        .await?;
    Ok(())
}
