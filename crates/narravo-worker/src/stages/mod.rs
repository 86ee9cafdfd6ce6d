//! The three material stages: prompts, images, audio.
//!
//! Each stage loads its sentences with their ancestors, validates
//! preconditions, fans out through the provider gateway under a bounded
//! pool, writes results back per sentence, and finally advances chapter
//! status when the whole chapter qualifies. Stages are idempotent at the
//! sentence level - re-running overwrites prior output.

pub mod audio;
pub mod image;
pub mod prompt;

pub use audio::run_audio_stage;
pub use image::run_image_stage;
pub use prompt::{run_prompt_stage_for_chapter, run_prompt_stage_for_sentences};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use narravo_models::{
    ApiKey, ApiKeyId, Chapter, ChapterId, ChapterStatus, ParagraphId, Sentence, SentenceId, UserId,
};
use narravo_provider::ProviderGateway;

use crate::error::{WorkerError, WorkerResult};
use crate::WorkerContext;

/// What a stage run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StageOutcome {
    /// Per the error contract, a stage only fails as a whole when every
    /// sentence failed; partial failure is carried on the sentences.
    pub fn into_result(self) -> WorkerResult<StageOutcome> {
        if self.total > 0 && self.succeeded == 0 {
            return Err(WorkerError::task_failed(format!(
                "all {} sentences failed",
                self.total
            )));
        }
        Ok(self)
    }
}

/// Resolved ancestors for a batch of sentences.
pub(crate) struct Ancestry {
    pub chapter_of_paragraph: HashMap<ParagraphId, ChapterId>,
    pub chapters: HashMap<ChapterId, Chapter>,
    pub owner_of_chapter: HashMap<ChapterId, UserId>,
}

impl Ancestry {
    pub fn owner_for(&self, sentence: &Sentence) -> Option<&UserId> {
        self.chapter_of_paragraph
            .get(&sentence.paragraph_id)
            .and_then(|id| self.owner_of_chapter.get(id))
    }
}

/// Load paragraphs, chapters and project owners for a sentence batch.
pub(crate) async fn load_ancestry(
    ctx: &WorkerContext,
    sentences: &[Sentence],
) -> WorkerResult<Ancestry> {
    let mut chapter_of_paragraph = HashMap::new();
    let mut chapters: HashMap<ChapterId, Chapter> = HashMap::new();
    let mut owner_of_chapter = HashMap::new();

    for sentence in sentences {
        if chapter_of_paragraph.contains_key(&sentence.paragraph_id) {
            continue;
        }
        let paragraph = ctx.catalog.get_paragraph(&sentence.paragraph_id).await?;
        let chapter_id = paragraph.chapter_id.clone();
        chapter_of_paragraph.insert(sentence.paragraph_id.clone(), chapter_id.clone());

        if !chapters.contains_key(&chapter_id) {
            let chapter = ctx.catalog.get_chapter(&chapter_id).await?;
            let project = ctx.catalog.get_project(&chapter.project_id).await?;
            owner_of_chapter.insert(chapter_id.clone(), project.owner_id);
            chapters.insert(chapter_id, chapter);
        }
    }

    Ok(Ancestry {
        chapter_of_paragraph,
        chapters,
        owner_of_chapter,
    })
}

/// Load the API key and build a gateway scoped to it.
pub(crate) async fn gateway_for_key(
    ctx: &WorkerContext,
    api_key_id: &ApiKeyId,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<(ProviderGateway, ApiKey)> {
    let key = ctx.catalog.get_api_key_by_id(api_key_id).await?;
    let plaintext = ctx.catalog.decrypt_api_key(&key)?;
    let gateway = ProviderGateway::for_key(
        key.provider,
        plaintext,
        key.base_url.clone(),
        ctx.config.gateway_concurrency,
    )
    .with_cancel(cancel);
    Ok((gateway, key))
}

/// Load a batch of sentences by id.
pub(crate) async fn load_sentences(
    ctx: &WorkerContext,
    sentence_ids: &[SentenceId],
) -> WorkerResult<Vec<Sentence>> {
    if sentence_ids.is_empty() {
        return Err(WorkerError::validation("no sentences given"));
    }
    let mut sentences = Vec::with_capacity(sentence_ids.len());
    for id in sentence_ids {
        sentences.push(ctx.catalog.get_sentence(id).await?);
    }
    Ok(sentences)
}

/// Record a per-sentence stage failure on its row.
pub(crate) async fn record_sentence_failure(
    ctx: &WorkerContext,
    sentence_id: &SentenceId,
    error: &WorkerError,
) {
    let message = error.to_string();
    if let Err(e) = ctx
        .catalog
        .update_sentence(sentence_id, |s| {
            s.mark_failed(message.clone());
            Ok(())
        })
        .await
    {
        warn!(sentence = %sentence_id, "failed to record sentence failure: {e}");
    }
}

/// Advance each chapter to `materials_prepared` once every sentence has
/// both image and audio.
pub(crate) async fn advance_prepared_chapters(
    ctx: &WorkerContext,
    chapter_ids: impl IntoIterator<Item = ChapterId>,
) -> WorkerResult<()> {
    for chapter_id in chapter_ids {
        let ready = ctx
            .catalog
            .all_chapter_sentences(&chapter_id, |s| s.is_ready_for_video())
            .await?;
        if ready {
            match ctx
                .catalog
                .advance_chapter_status(&chapter_id, ChapterStatus::MaterialsPrepared)
                .await
            {
                Ok(_) => info!(chapter = %chapter_id, "chapter materials prepared"),
                // A concurrent run may already have advanced further.
                Err(narravo_catalog::CatalogError::BusinessRule(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

/// Record gateway usage on the key, best effort.
pub(crate) async fn record_usage(ctx: &WorkerContext, key: &ApiKey, calls: u64) {
    if calls == 0 {
        return;
    }
    if let Err(e) = ctx.catalog.record_api_key_usage(&key.id, calls).await {
        warn!(api_key = %key.id, "failed to record API key usage: {e}");
    }
}

/// Shared bounded fan-out over sentences.
///
/// `work` receives each sentence and must be a cloneable async closure;
/// results come back as `(sentence, result)` pairs in completion order.
pub(crate) async fn fan_out<F, Fut>(
    ctx: &Arc<WorkerContext>,
    sentences: Vec<Sentence>,
    parallel: usize,
    work: F,
) -> WorkerResult<StageOutcome>
where
    F: Fn(Sentence) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = WorkerResult<()>> + Send + 'static,
{
    let total = sentences.len();
    let semaphore = Arc::new(tokio::sync::Semaphore::new(parallel.max(1)));
    let mut join_set = tokio::task::JoinSet::new();

    for sentence in sentences {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::Cancelled)?;
        let work = work.clone();
        let ctx = Arc::clone(ctx);
        join_set.spawn(async move {
            let _permit = permit;
            let sentence_id = sentence.id.clone();
            let result = work(sentence).await;
            if let Err(ref e) = result {
                record_sentence_failure(&ctx, &sentence_id, e).await;
            }
            result
        });
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(())) => succeeded += 1,
            Ok(Err(_)) => failed += 1,
            Err(e) => {
                warn!("stage worker panicked: {e}");
                failed += 1;
            }
        }
    }

    Ok(StageOutcome {
        total,
        succeeded,
        failed,
    })
}
