//! Video task runner: drives one chapter's video task end to end.
//!
//! ```text
//! pending -> validating -> downloading_materials -> synthesizing_videos
//!         -> concatenating -> uploading -> completed
//! any state -> failed (error_message, error_sentence_id?)
//! ```
//!
//! Every step persists its checkpoint before moving on, so a failed task
//! can be reset and retried without losing `current_sentence_index`. Any
//! sentence failure fails the whole task - no partial chapter videos.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use narravo_media::{concat_clips, media_duration};
use narravo_models::{
    ChapterStatus, Sentence, SentenceId, TaskId, VideoTask, VideoTaskId, VideoTaskStatus,
};
use narravo_provider::ProviderGateway;
use narravo_storage::{object_key, KeyPurpose};
use narravo_subtitle::SubtitleCorrector;

use crate::error::{WorkerError, WorkerResult};
use crate::synthesizer::SentenceSynthesizer;
use crate::WorkerContext;

/// A step failure plus the sentence it happened on, when known.
struct RunFailure {
    error: WorkerError,
    sentence_id: Option<SentenceId>,
}

impl RunFailure {
    fn new(error: WorkerError) -> Self {
        Self {
            error,
            sentence_id: None,
        }
    }

    fn on_sentence(error: WorkerError, sentence_id: SentenceId) -> Self {
        Self {
            error,
            sentence_id: Some(sentence_id),
        }
    }
}

impl From<WorkerError> for RunFailure {
    fn from(error: WorkerError) -> Self {
        Self::new(error)
    }
}

impl From<narravo_catalog::CatalogError> for RunFailure {
    fn from(e: narravo_catalog::CatalogError) -> Self {
        Self::new(e.into())
    }
}

/// Drives a single chapter video task.
pub struct VideoTaskRunner {
    ctx: Arc<WorkerContext>,
}

impl VideoTaskRunner {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Run the task to completion; on error the task row carries the
    /// failure and the preserved checkpoint.
    pub async fn run(
        &self,
        video_task_id: &VideoTaskId,
        scheduler_task_id: &TaskId,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<()> {
        match self.drive(video_task_id, scheduler_task_id, cancel).await {
            Ok(()) => Ok(()),
            Err(failure) => {
                let message = if failure.error.is_cancelled() {
                    "cancelled".to_string()
                } else {
                    failure.error.to_string()
                };
                self.ctx
                    .catalog
                    .fail_video_task(video_task_id, &message, failure.sentence_id.clone())
                    .await
                    .ok();
                self.publish(scheduler_task_id, None, "failed", Some(message.clone()))
                    .await;
                warn!(task = %video_task_id, "video task failed: {message}");
                Err(failure.error)
            }
        }
    }

    async fn publish(
        &self,
        scheduler_task_id: &TaskId,
        progress: Option<u8>,
        status: &str,
        details: Option<String>,
    ) {
        self.ctx
            .progress
            .update(scheduler_task_id, progress, Some(status), details)
            .await
            .ok();
    }

    async fn set_status(
        &self,
        id: &VideoTaskId,
        scheduler_task_id: &TaskId,
        status: VideoTaskStatus,
        progress: Option<u8>,
    ) -> Result<VideoTask, RunFailure> {
        let task = self
            .ctx
            .catalog
            .update_video_task(id, |t| {
                t.set_status(status);
                if let Some(p) = progress {
                    t.set_progress(p);
                }
                Ok(())
            })
            .await?;
        self.publish(scheduler_task_id, progress, status.as_str(), None)
            .await;
        Ok(task)
    }

    async fn drive(
        &self,
        video_task_id: &VideoTaskId,
        scheduler_task_id: &TaskId,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), RunFailure> {
        let ctx = &self.ctx;

        // 1. validating
        let task = ctx.catalog.get_video_task(video_task_id).await?;
        if task.status != VideoTaskStatus::Pending {
            return Err(RunFailure::new(WorkerError::validation(format!(
                "video task must be pending to start, status is {}",
                task.status
            ))));
        }
        self.set_status(video_task_id, scheduler_task_id, VideoTaskStatus::Validating, None)
            .await?;

        let chapter = ctx.catalog.get_chapter(&task.chapter_id).await?;
        if !matches!(
            chapter.status,
            ChapterStatus::MaterialsPrepared | ChapterStatus::GeneratingVideo
        ) {
            return Err(RunFailure::new(WorkerError::validation(format!(
                "chapter must have materials prepared, status is {}",
                chapter.status
            ))));
        }

        let sentences = ctx.catalog.list_chapter_sentences(&task.chapter_id).await?;
        if sentences.is_empty() {
            return Err(RunFailure::new(WorkerError::validation(
                "chapter has no sentences",
            )));
        }
        if let Some(unready) = sentences.iter().find(|s| !s.is_ready_for_video()) {
            return Err(RunFailure::on_sentence(
                WorkerError::validation(format!(
                    "sentence {} is missing image or audio",
                    unready.id
                )),
                unready.id.clone(),
            ));
        }

        let total = sentences.len();
        ctx.catalog
            .update_video_task(video_task_id, |t| {
                t.total_sentences = Some(total as u32);
                Ok(())
            })
            .await?;

        if chapter.status == ChapterStatus::MaterialsPrepared {
            ctx.catalog
                .advance_chapter_status(&task.chapter_id, ChapterStatus::GeneratingVideo)
                .await
                .ok();
        }

        // 2. downloading_materials - materials resolve lazily inside each
        // sentence's synthesis; this state marks the boundary for clients.
        self.set_status(
            video_task_id,
            scheduler_task_id,
            VideoTaskStatus::DownloadingMaterials,
            None,
        )
        .await?;

        // Optional per-sentence subtitle correction.
        let corrector = self.build_corrector(&task, cancel.clone()).await?;

        // Fresh temp dir per attempt; prior partial output is not reused.
        tokio::fs::create_dir_all(&ctx.config.work_dir)
            .await
            .map_err(WorkerError::from)?;
        let temp_dir = tempfile::Builder::new()
            .prefix("narravo_video_")
            .tempdir_in(&ctx.config.work_dir)
            .map_err(WorkerError::from)?;

        // 3. synthesizing_videos
        self.set_status(
            video_task_id,
            scheduler_task_id,
            VideoTaskStatus::SynthesizingVideos,
            None,
        )
        .await?;

        let clips = self
            .synthesize_all(
                video_task_id,
                scheduler_task_id,
                &task,
                &sentences,
                temp_dir.path().to_path_buf(),
                corrector.clone(),
                cancel.clone(),
            )
            .await?;

        // Usage accounting: one correction call per sentence.
        if corrector.is_some() {
            if let Some(ref api_key_id) = task.api_key_id {
                ctx.catalog
                    .record_api_key_usage(api_key_id, total as u64)
                    .await
                    .ok();
            }
        }

        // Record each sentence's slot on the chapter timeline. Best
        // effort: the video itself does not depend on these rows.
        let mut cursor = 0.0f64;
        for (sentence, clip) in sentences.iter().zip(&clips) {
            match media_duration(clip).await {
                Ok(clip_duration) => {
                    let start = cursor;
                    let end = cursor + clip_duration;
                    cursor = end;
                    ctx.catalog
                        .update_sentence(&sentence.id, |s| {
                            s.start_time = Some(start);
                            s.end_time = Some(end);
                            s.duration = Some(clip_duration);
                            Ok(())
                        })
                        .await
                        .ok();
                }
                Err(e) => {
                    warn!(sentence = %sentence.id, "failed to probe clip duration: {e}");
                    break;
                }
            }
        }

        // 4. concatenating
        self.set_status(
            video_task_id,
            scheduler_task_id,
            VideoTaskStatus::Concatenating,
            Some(85),
        )
        .await?;

        let manifest = temp_dir.path().join("concat.txt");
        let final_video = temp_dir.path().join("final_video.mp4");
        concat_clips(&clips, &manifest, &final_video, Some(cancel.clone()))
            .await
            .map_err(WorkerError::from)?;

        // 5. uploading - a fresh key per attempt, so a retry never collides
        // with an earlier upload.
        self.set_status(
            video_task_id,
            scheduler_task_id,
            VideoTaskStatus::Uploading,
            Some(90),
        )
        .await?;

        let video_key = object_key(KeyPurpose::Videos, task.user_id.as_str(), "mp4");
        ctx.storage
            .upload_file(&final_video, &video_key, "video/mp4")
            .await
            .map_err(WorkerError::from)?;
        let duration = media_duration(&final_video)
            .await
            .map_err(WorkerError::from)? as u32;

        // 6. completed
        ctx.catalog
            .complete_video_task(video_task_id, &video_key, duration)
            .await?;
        ctx.catalog
            .set_chapter_video(&task.chapter_id, &video_key, duration)
            .await?;
        self.publish(scheduler_task_id, Some(100), "completed", None).await;

        info!(
            task = %video_task_id,
            chapter = %task.chapter_id,
            %video_key,
            duration,
            "chapter video completed"
        );
        Ok(())
    }

    async fn build_corrector(
        &self,
        task: &VideoTask,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<Arc<SubtitleCorrector>>, RunFailure> {
        let Some(ref api_key_id) = task.api_key_id else {
            return Ok(None);
        };
        match self.ctx.catalog.get_api_key_by_id(api_key_id).await {
            Ok(key) => {
                let plaintext = self.ctx.catalog.decrypt_api_key(&key)?;
                let gateway = ProviderGateway::for_key(
                    key.provider,
                    plaintext,
                    key.base_url.clone(),
                    self.ctx.config.gateway_concurrency,
                )
                .with_cancel(cancel);
                let model = task
                    .generation_settings
                    .llm_model
                    .clone()
                    .unwrap_or_else(|| key.provider.default_chat_model().to_string());
                Ok(Some(Arc::new(SubtitleCorrector::new(gateway, model))))
            }
            Err(e) => {
                // Correction is best-effort; a missing key downgrades to
                // uncorrected subtitles.
                warn!("failed to load API key for subtitle correction: {e}");
                Ok(None)
            }
        }
    }

    /// Bounded-parallel synthesis of every sentence, in order, with
    /// contiguous-prefix checkpointing.
    #[allow(clippy::too_many_arguments)]
    async fn synthesize_all(
        &self,
        video_task_id: &VideoTaskId,
        scheduler_task_id: &TaskId,
        task: &VideoTask,
        sentences: &[Sentence],
        work_dir: PathBuf,
        corrector: Option<Arc<SubtitleCorrector>>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<PathBuf>, RunFailure> {
        let ctx = &self.ctx;
        let total = sentences.len();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            ctx.config.sentence_parallel.max(1),
        ));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, sentence) in sentences.iter().cloned().enumerate() {
            let synthesizer = SentenceSynthesizer::new(
                ctx.resolver.clone(),
                Arc::clone(&ctx.transcriber),
                corrector.clone(),
                task.generation_settings.clone(),
                cancel.clone(),
            );
            let semaphore = Arc::clone(&semaphore);
            let work_dir = work_dir.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, sentence.id.clone(), Err(WorkerError::Cancelled)),
                };
                let result = synthesizer.synthesize(&sentence, &work_dir, index).await;
                (index, sentence.id, result)
            });
        }

        let mut clips: Vec<Option<PathBuf>> = vec![None; total];
        let mut done = vec![false; total];
        let mut completed = 0usize;
        let mut checkpointed_prefix: Option<usize> = None;
        let mut failure: Option<RunFailure> = None;

        while let Some(joined) = join_set.join_next().await {
            let (index, sentence_id, result) = match joined {
                Ok(tuple) => tuple,
                Err(e) => {
                    if e.is_cancelled() {
                        continue;
                    }
                    failure.get_or_insert(RunFailure::new(WorkerError::task_failed(format!(
                        "synthesis worker panicked: {e}"
                    ))));
                    join_set.abort_all();
                    continue;
                }
            };

            match result {
                Ok(path) => {
                    clips[index] = Some(path);
                    done[index] = true;
                    completed += 1;

                    // The checkpoint is the last index of the contiguous
                    // completed prefix - out-of-order completions past a
                    // gap don't count yet.
                    let prefix = contiguous_prefix(&done);
                    if prefix != checkpointed_prefix {
                        if let Some(last) = prefix {
                            let progress =
                                VideoTask::synthesis_progress(completed as u32, total as u32);
                            ctx.catalog
                                .video_task_checkpoint(video_task_id, last as u32, progress)
                                .await?;
                            self.publish(
                                scheduler_task_id,
                                Some(progress),
                                VideoTaskStatus::SynthesizingVideos.as_str(),
                                Some(format!("sentence {}/{}", completed, total)),
                            )
                            .await;
                        }
                        checkpointed_prefix = prefix;
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(RunFailure::on_sentence(e, sentence_id));
                        join_set.abort_all();
                    }
                }
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }

        let clips: Vec<PathBuf> = clips.into_iter().map(|c| c.expect("all done")).collect();
        Ok(clips)
    }
}

/// Last index of the contiguous `true` prefix, if any.
fn contiguous_prefix(done: &[bool]) -> Option<usize> {
    let mut last = None;
    for (i, flag) in done.iter().enumerate() {
        if *flag {
            last = Some(i);
        } else {
            break;
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use narravo_catalog::Catalog;
    use narravo_models::{
        Chapter, GenerationSettings, Paragraph, Project, ProjectFileType, Transcript, UserId,
    };
    use narravo_queue::ProgressChannel;
    use narravo_storage::{MaterialResolver, StorageClient, StorageConfig};
    use narravo_subtitle::{SubtitleResult, Transcriber};
    use std::path::Path;

    use crate::parser::HeuristicParser;
    use crate::{WorkerConfig, WorkerContext};

    struct StubTranscriber;

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _audio_path: &Path) -> SubtitleResult<Transcript> {
            Ok(Transcript::empty())
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    async fn test_ctx() -> Arc<WorkerContext> {
        let storage = StorageClient::new(StorageConfig {
            endpoint_url: "http://127.0.0.1:1".into(),
            access_key_id: "test".into(),
            secret_access_key: "test".into(),
            bucket_name: "narravo-test".into(),
            region: "auto".into(),
        })
        .await
        .expect("client construction is offline");

        Arc::new(WorkerContext {
            config: WorkerConfig::default(),
            catalog: Catalog::in_memory("test-secret"),
            resolver: MaterialResolver::new(storage.clone()),
            storage,
            // Nothing is listening; publish attempts fail and are ignored.
            progress: ProgressChannel::new("redis://127.0.0.1:1").unwrap(),
            transcriber: Arc::new(StubTranscriber),
            parser: Arc::new(HeuristicParser::new()),
        })
    }

    async fn seed_chapter(ctx: &WorkerContext, prepared: bool) -> (Chapter, Vec<Sentence>) {
        let owner = UserId::new();
        let project = Project::new(
            owner.clone(),
            "novel",
            "novel.txt",
            1,
            ProjectFileType::Txt,
            "uploads/x",
            "hash",
        );
        ctx.catalog.create_project(&project).await.unwrap();

        let chapter = Chapter::new(project.id.clone(), "第一章", "A。B。", 1);
        ctx.catalog.insert_chapter(&chapter).await.unwrap();
        ctx.catalog.confirm_chapter(&chapter.id).await.unwrap();

        let paragraph = Paragraph::new(chapter.id.clone(), 1, "A。B。");
        ctx.catalog.insert_paragraphs(&[paragraph.clone()]).await.unwrap();

        let sentences = vec![
            Sentence::new(paragraph.id.clone(), 1, "A。"),
            Sentence::new(paragraph.id.clone(), 2, "B。"),
        ];
        ctx.catalog.insert_sentences(&sentences).await.unwrap();

        if prepared {
            for s in &sentences {
                ctx.catalog
                    .update_sentence(&s.id, |row| {
                        row.set_image_key("images/u/20260801/i.png");
                        row.set_audio_key("audio/u/20260801/a.mp3");
                        Ok(())
                    })
                    .await
                    .unwrap();
            }
            ctx.catalog
                .advance_chapter_status(&chapter.id, ChapterStatus::MaterialsPrepared)
                .await
                .unwrap();
        }

        let chapter = ctx.catalog.get_chapter(&chapter.id).await.unwrap();
        (chapter, sentences)
    }

    fn video_task(chapter: &Chapter) -> VideoTask {
        VideoTask::new(
            UserId::new(),
            chapter.project_id.clone(),
            chapter.id.clone(),
            None,
            None,
            GenerationSettings::default(),
        )
    }

    #[tokio::test]
    async fn unprepared_chapter_fails_validation() {
        let ctx = test_ctx().await;
        let (chapter, _) = seed_chapter(&ctx, false).await;
        let task = video_task(&chapter);
        ctx.catalog.insert_video_task(&task).await.unwrap();

        let runner = VideoTaskRunner::new(Arc::clone(&ctx));
        let (_, cancel) = watch::channel(false);
        let result = runner.run(&task.id, &TaskId::new(), cancel).await;
        assert!(result.is_err());

        let row = ctx.catalog.get_video_task(&task.id).await.unwrap();
        assert_eq!(row.status, VideoTaskStatus::Failed);
        assert!(row
            .error_message
            .as_deref()
            .unwrap()
            .contains("materials prepared"));
    }

    #[tokio::test]
    async fn missing_material_records_the_failing_sentence() {
        let ctx = test_ctx().await;
        let (chapter, sentences) = seed_chapter(&ctx, true).await;

        // Knock the audio out of the second sentence.
        ctx.catalog
            .update_sentence(&sentences[1].id, |row| {
                row.audio_url = None;
                Ok(())
            })
            .await
            .unwrap();

        let task = video_task(&chapter);
        ctx.catalog.insert_video_task(&task).await.unwrap();

        let runner = VideoTaskRunner::new(Arc::clone(&ctx));
        let (_, cancel) = watch::channel(false);
        let result = runner.run(&task.id, &TaskId::new(), cancel).await;
        assert!(result.is_err());

        let row = ctx.catalog.get_video_task(&task.id).await.unwrap();
        assert_eq!(row.status, VideoTaskStatus::Failed);
        assert_eq!(row.error_sentence_id.as_ref(), Some(&sentences[1].id));
    }

    #[tokio::test]
    async fn non_pending_task_is_rejected() {
        let ctx = test_ctx().await;
        let (chapter, _) = seed_chapter(&ctx, true).await;
        let task = video_task(&chapter);
        ctx.catalog.insert_video_task(&task).await.unwrap();
        ctx.catalog
            .set_video_task_status(&task.id, VideoTaskStatus::Concatenating)
            .await
            .unwrap();

        let runner = VideoTaskRunner::new(Arc::clone(&ctx));
        let (_, cancel) = watch::channel(false);
        let result = runner.run(&task.id, &TaskId::new(), cancel).await;
        assert!(matches!(result, Err(WorkerError::Validation(_))));
    }

    #[test]
    fn contiguous_prefix_tracks_gaps() {
        assert_eq!(contiguous_prefix(&[false, false]), None);
        assert_eq!(contiguous_prefix(&[true, false, true]), Some(0));
        assert_eq!(contiguous_prefix(&[true, true, false]), Some(1));
        assert_eq!(contiguous_prefix(&[true, true, true]), Some(2));
    }
}
