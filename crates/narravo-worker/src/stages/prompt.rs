//! Prompt stage: one image-generation prompt per sentence.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use narravo_models::{ApiKeyId, ChapterId, ChapterStatus, SentenceId};
use narravo_provider::{ChatMessage, ChatOptions, ProviderGateway};

use crate::error::{WorkerError, WorkerResult};
use crate::stages::{
    fan_out, gateway_for_key, load_ancestry, load_sentences, record_usage, StageOutcome,
};
use crate::WorkerContext;

/// Visual style presets for the prompt directive.
fn style_directive(style: &str) -> &'static str {
    match style {
        "comic" | "漫画" => "画面风格为二次元漫画插画，线条干净，色彩明快",
        "realistic" | "写实" => "画面风格为写实摄影，自然光影，细节丰富",
        "watercolor" | "水彩" => "画面风格为水彩手绘，笔触柔和，色彩清透",
        "cinematic" | "电影" => "画面风格为电影剧照，浅景深，戏剧化打光",
        _ => "画面风格为二次元漫画插画，线条干净，色彩明快",
    }
}

fn build_system_prompt(style: &str) -> String {
    format!(
        "你是专业的AI绘画提示词工程师。根据给定的小说句子，为文生图模型写一条画面描述。\n\
         要求：\n\
         1. 只描述画面：场景、人物、动作、气氛、光线\n\
         2. {}\n\
         3. 不要出现人名，用外貌特征指代人物\n\
         4. 一句话输出，不要解释，不要引号",
        style_directive(style)
    )
}

/// Generate prompts for every sentence of a chapter.
///
/// The chapter must be confirmed; it is moved to `generating_prompts`
/// while the stage runs and to `generated_prompts` once every sentence
/// carries a prompt.
pub async fn run_prompt_stage_for_chapter(
    ctx: Arc<WorkerContext>,
    chapter_id: &ChapterId,
    api_key_id: &ApiKeyId,
    style: &str,
    model: Option<String>,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<StageOutcome> {
    let chapter = ctx.catalog.get_chapter(chapter_id).await?;
    if !chapter.is_confirmed || chapter.status == ChapterStatus::Failed {
        return Err(WorkerError::validation(format!(
            "chapter must be confirmed before prompt generation, status is {}",
            chapter.status
        )));
    }
    // Re-runs in or past the prompt phase are legal; they overwrite.
    if chapter.status == ChapterStatus::Confirmed {
        ctx.catalog
            .advance_chapter_status(chapter_id, ChapterStatus::GeneratingPrompts)
            .await?;
    }

    let sentences = ctx.catalog.list_chapter_sentences(chapter_id).await?;
    if sentences.is_empty() {
        return Err(WorkerError::validation("chapter has no sentences"));
    }
    let ids: Vec<SentenceId> = sentences.iter().map(|s| s.id.clone()).collect();

    run_prompt_stage_for_sentences(ctx, &ids, api_key_id, style, model, cancel).await
}

/// Generate prompts for an explicit sentence subset.
pub async fn run_prompt_stage_for_sentences(
    ctx: Arc<WorkerContext>,
    sentence_ids: &[SentenceId],
    api_key_id: &ApiKeyId,
    style: &str,
    model: Option<String>,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<StageOutcome> {
    let sentences = load_sentences(&ctx, sentence_ids).await?;
    let ancestry = load_ancestry(&ctx, &sentences).await?;
    let chapter_ids: Vec<ChapterId> = ancestry.chapters.keys().cloned().collect();

    let (gateway, key) = gateway_for_key(&ctx, api_key_id, cancel).await?;
    let model = model.unwrap_or_else(|| key.provider.default_chat_model().to_string());
    let system_prompt = Arc::new(build_system_prompt(style));

    info!(
        sentences = sentences.len(),
        %model,
        style,
        "prompt stage starting"
    );

    let ctx_for_work = Arc::clone(&ctx);
    let gateway_for_work = gateway.clone();
    let model_for_work = model.clone();
    let outcome = fan_out(&ctx, sentences, ctx.config.stage_parallel, move |sentence| {
        let ctx = Arc::clone(&ctx_for_work);
        let gateway = gateway_for_work.clone();
        let model = model_for_work.clone();
        let system_prompt = Arc::clone(&system_prompt);
        generate_one(ctx, gateway, model, system_prompt, sentence)
    })
    .await?;

    record_usage(&ctx, &key, outcome.succeeded as u64).await;

    // A chapter advances only when every one of its sentences has a prompt.
    for chapter_id in chapter_ids {
        let all_prompted = ctx
            .catalog
            .all_chapter_sentences(&chapter_id, |s| s.image_prompt.is_some())
            .await?;
        if all_prompted {
            match ctx
                .catalog
                .advance_chapter_status(&chapter_id, ChapterStatus::GeneratedPrompts)
                .await
            {
                Ok(_) => info!(chapter = %chapter_id, "all prompts generated"),
                Err(narravo_catalog::CatalogError::BusinessRule(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    outcome.into_result()
}

async fn generate_one(
    ctx: Arc<WorkerContext>,
    gateway: ProviderGateway,
    model: String,
    system_prompt: Arc<String>,
    sentence: narravo_models::Sentence,
) -> WorkerResult<()> {
    ctx.catalog
        .update_sentence(&sentence.id, |s| {
            s.status = narravo_models::SentenceStatus::Processing;
            Ok(())
        })
        .await?;

    let messages = [
        ChatMessage::system(system_prompt.as_str()),
        ChatMessage::user(sentence.effective_content()),
    ];
    let reply = gateway
        .chat(&messages, &model, &ChatOptions::default())
        .await?;

    let prompt = reply.message.trim().to_string();
    if prompt.is_empty() {
        return Err(WorkerError::task_failed("model returned an empty prompt"));
    }

    ctx.catalog
        .update_sentence(&sentence.id, |s| {
            s.set_image_prompt(prompt.clone());
            Ok(())
        })
        .await?;
    Ok(())
}
