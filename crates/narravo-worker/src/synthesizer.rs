//! Sentence synthesizer: one sentence -> one MP4 clip.
//!
//! Resolve materials into the working directory, probe the voice-over,
//! transcribe, optionally correct, render subtitle overlays, compose.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use narravo_media::{
    build_sentence_clip_command, media_duration, FfmpegRunner, SentenceClipSpec,
    SENTENCE_CLIP_TIMEOUT_SECS,
};
use narravo_models::{GenerationSettings, Sentence};
use narravo_storage::MaterialResolver;
use narravo_subtitle::{
    drawtext_filter, render_overlays, SubtitleCorrector, SubtitleLayout, Transcriber,
};

use crate::error::{WorkerError, WorkerResult};

/// Builds one clip per sentence inside a video task's temp directory.
pub struct SentenceSynthesizer {
    resolver: MaterialResolver,
    transcriber: Arc<dyn Transcriber>,
    corrector: Option<Arc<SubtitleCorrector>>,
    settings: GenerationSettings,
    cancel: watch::Receiver<bool>,
}

impl SentenceSynthesizer {
    pub fn new(
        resolver: MaterialResolver,
        transcriber: Arc<dyn Transcriber>,
        corrector: Option<Arc<SubtitleCorrector>>,
        settings: GenerationSettings,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            resolver,
            transcriber,
            corrector,
            settings,
            cancel,
        }
    }

    fn check_cancelled(&self) -> WorkerResult<()> {
        if *self.cancel.borrow() {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    /// Produce the clip for one sentence. `index` is the sentence's
    /// position in the chapter's concat order.
    pub async fn synthesize(
        &self,
        sentence: &Sentence,
        work_dir: &Path,
        index: usize,
    ) -> WorkerResult<PathBuf> {
        let image_ref = sentence
            .image_url
            .as_deref()
            .ok_or_else(|| WorkerError::validation(format!("sentence {} has no image", sentence.id)))?;
        let audio_ref = sentence
            .audio_url
            .as_deref()
            .ok_or_else(|| WorkerError::validation(format!("sentence {} has no audio", sentence.id)))?;

        let sentence_dir = work_dir.join(format!("sentence_{index:03}"));
        tokio::fs::create_dir_all(&sentence_dir).await?;

        // Materialize inputs.
        self.check_cancelled()?;
        let image_path = sentence_dir.join("image.jpg");
        let audio_path = sentence_dir.join("audio.mp3");
        self.resolver.resolve(image_ref, &image_path).await?;
        self.resolver.resolve(audio_ref, &audio_path).await?;

        self.check_cancelled()?;
        let duration = media_duration(&audio_path).await?;
        if duration <= 0.0 {
            return Err(WorkerError::validation(format!(
                "voice-over for sentence {} has zero duration",
                sentence.id
            )));
        }

        // Subtitle timeline, optionally corrected.
        self.check_cancelled()?;
        let mut transcript = self.transcriber.transcribe(&audio_path).await?;
        if let Some(ref corrector) = self.corrector {
            transcript = corrector
                .correct(&transcript, sentence.effective_content())
                .await;
        }

        let layout = SubtitleLayout::from_settings(&self.settings);
        let overlays = render_overlays(&transcript, &layout);
        let filter = drawtext_filter(&overlays, &layout);
        debug!(
            sentence = %sentence.id,
            overlays = overlays.len(),
            duration,
            "subtitles rendered"
        );

        // Compose.
        let output = sentence_dir.join("video.mp4");
        let spec = SentenceClipSpec::new(&image_path, &audio_path, &output, filter, duration);
        let cmd = build_sentence_clip_command(&spec, &self.settings);
        FfmpegRunner::new()
            .with_timeout(SENTENCE_CLIP_TIMEOUT_SECS)
            .with_cancel(self.cancel.clone())
            .run(&cmd)
            .await?;

        info!(sentence = %sentence.id, index, clip = %output.display(), "sentence clip composed");
        Ok(output)
    }
}
