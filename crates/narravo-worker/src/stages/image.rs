//! Image stage: render each sentence's prompt into a stored image.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use narravo_models::{ApiKeyId, ChapterId, ProviderKind, SentenceId, UserId};
use narravo_provider::{ImageOptions, ProviderGateway};
use narravo_storage::KeyPurpose;

use crate::error::{WorkerError, WorkerResult};
use crate::stages::{
    advance_prepared_chapters, fan_out, gateway_for_key, load_ancestry, load_sentences,
    record_usage, StageOutcome,
};
use crate::WorkerContext;

fn default_image_model(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::GeminiImage => "gemini-3-pro-image-preview",
        ProviderKind::Siliconflow | ProviderKind::Custom => "Kwai-Kolors/Kolors",
        _ => "dall-e-3",
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Generate images for the given sentences.
///
/// Precondition: every listed sentence already has an `image_prompt`.
pub async fn run_image_stage(
    ctx: Arc<WorkerContext>,
    sentence_ids: &[SentenceId],
    api_key_id: &ApiKeyId,
    model: Option<String>,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<StageOutcome> {
    let sentences = load_sentences(&ctx, sentence_ids).await?;
    if let Some(missing) = sentences.iter().find(|s| s.image_prompt.is_none()) {
        return Err(WorkerError::validation(format!(
            "sentence {} has no image prompt",
            missing.id
        )));
    }

    let ancestry = load_ancestry(&ctx, &sentences).await?;
    let chapter_ids: Vec<ChapterId> = ancestry.chapters.keys().cloned().collect();
    let owners: std::collections::HashMap<SentenceId, UserId> = sentences
        .iter()
        .filter_map(|s| ancestry.owner_for(s).map(|u| (s.id.clone(), u.clone())))
        .collect();

    let (gateway, key) = gateway_for_key(&ctx, api_key_id, cancel).await?;
    let model = model.unwrap_or_else(|| default_image_model(key.provider).to_string());

    info!(sentences = sentences.len(), %model, "image stage starting");

    let ctx_for_work = Arc::clone(&ctx);
    let gateway_for_work = gateway.clone();
    let model_for_work = model.clone();
    let owners = Arc::new(owners);
    let outcome = fan_out(&ctx, sentences, ctx.config.stage_parallel, move |sentence| {
        let ctx = Arc::clone(&ctx_for_work);
        let gateway = gateway_for_work.clone();
        let model = model_for_work.clone();
        let owners = Arc::clone(&owners);
        generate_one(ctx, gateway, model, owners, sentence)
    })
    .await?;

    record_usage(&ctx, &key, outcome.succeeded as u64).await;
    advance_prepared_chapters(&ctx, chapter_ids).await?;

    outcome.into_result()
}

async fn generate_one(
    ctx: Arc<WorkerContext>,
    gateway: ProviderGateway,
    model: String,
    owners: Arc<std::collections::HashMap<SentenceId, UserId>>,
    sentence: narravo_models::Sentence,
) -> WorkerResult<()> {
    let owner = owners
        .get(&sentence.id)
        .ok_or_else(|| WorkerError::validation(format!("no owner for sentence {}", sentence.id)))?;
    let prompt = sentence
        .image_prompt
        .clone()
        .ok_or_else(|| WorkerError::validation("image prompt disappeared"))?;

    let image = gateway
        .image(&prompt, &model, &ImageOptions::default())
        .await?;

    let key = ctx
        .storage
        .put(
            owner.as_str(),
            image.bytes,
            KeyPurpose::Images,
            extension_for_mime(&image.mime),
        )
        .await?;

    ctx.catalog
        .update_sentence(&sentence.id, |s| {
            s.set_image_key(key.clone());
            Ok(())
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models_track_provider_family() {
        assert_eq!(
            default_image_model(ProviderKind::GeminiImage),
            "gemini-3-pro-image-preview"
        );
        assert_eq!(default_image_model(ProviderKind::Siliconflow), "Kwai-Kolors/Kolors");
        assert_eq!(default_image_model(ProviderKind::OpenaiCompatible), "dall-e-3");
    }

    #[test]
    fn mime_extension_mapping() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("application/weird"), "png");
    }
}
