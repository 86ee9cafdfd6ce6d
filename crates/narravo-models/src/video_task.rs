//! Video task model - one attempt at turning a chapter into a video.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{ApiKeyId, ChapterId, ProjectId, SentenceId, UserId, VideoTaskId};
use crate::settings::GenerationSettings;

/// Video task status.
///
/// ```text
/// pending -> validating -> downloading_materials -> synthesizing_videos
///         -> concatenating -> uploading -> completed
/// any state -> failed
/// failed -> pending (reset_for_retry, checkpoint preserved)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoTaskStatus {
    #[default]
    Pending,
    Validating,
    DownloadingMaterials,
    GeneratingSubtitles,
    SynthesizingVideos,
    Concatenating,
    Uploading,
    Completed,
    Failed,
}

impl VideoTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoTaskStatus::Pending => "pending",
            VideoTaskStatus::Validating => "validating",
            VideoTaskStatus::DownloadingMaterials => "downloading_materials",
            VideoTaskStatus::GeneratingSubtitles => "generating_subtitles",
            VideoTaskStatus::SynthesizingVideos => "synthesizing_videos",
            VideoTaskStatus::Concatenating => "concatenating",
            VideoTaskStatus::Uploading => "uploading",
            VideoTaskStatus::Completed => "completed",
            VideoTaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoTaskStatus::Completed | VideoTaskStatus::Failed)
    }

    /// In-flight tasks cannot be deleted.
    pub fn is_in_flight(&self) -> bool {
        !matches!(
            self,
            VideoTaskStatus::Pending | VideoTaskStatus::Completed | VideoTaskStatus::Failed
        )
    }
}

impl std::fmt::Display for VideoTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chapter-video generation attempt with a resume checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoTask {
    pub id: VideoTaskId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub chapter_id: ChapterId,
    /// Optional key for per-sentence subtitle correction.
    #[serde(default)]
    pub api_key_id: Option<ApiKeyId>,
    /// Optional background music/image reference.
    #[serde(default)]
    pub background_id: Option<String>,
    pub generation_settings: GenerationSettings,

    pub status: VideoTaskStatus,
    /// 0-100, monotone non-decreasing within a single successful run.
    pub progress: u8,
    /// Index of the last fully materialized sentence; the resume checkpoint.
    #[serde(default)]
    pub current_sentence_index: Option<u32>,
    #[serde(default)]
    pub total_sentences: Option<u32>,

    /// Object-store key of the finished video.
    #[serde(default)]
    pub video_key: Option<String>,
    #[serde(default)]
    pub video_duration: Option<u32>,

    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_sentence_id: Option<SentenceId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoTask {
    pub fn new(
        user_id: UserId,
        project_id: ProjectId,
        chapter_id: ChapterId,
        api_key_id: Option<ApiKeyId>,
        background_id: Option<String>,
        generation_settings: GenerationSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VideoTaskId::new(),
            user_id,
            project_id,
            chapter_id,
            api_key_id,
            background_id,
            generation_settings,
            status: VideoTaskStatus::Pending,
            progress: 0,
            current_sentence_index: None,
            total_sentences: None,
            video_key: None,
            video_duration: None,
            error_message: None,
            error_sentence_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: VideoTaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Progress is clamped and never moves backward within a run.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
    }

    /// Record the last fully materialized sentence.
    pub fn set_checkpoint(&mut self, sentence_index: u32) {
        let idx = match self.current_sentence_index {
            Some(prev) => prev.max(sentence_index),
            None => sentence_index,
        };
        self.current_sentence_index = Some(idx);
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, video_key: impl Into<String>, duration: u32) {
        self.status = VideoTaskStatus::Completed;
        self.progress = 100;
        self.video_key = Some(video_key.into());
        self.video_duration = Some(duration);
        self.error_message = None;
        self.error_sentence_id = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, sentence_id: Option<SentenceId>) {
        self.status = VideoTaskStatus::Failed;
        self.error_message = Some(error.into());
        if sentence_id.is_some() {
            self.error_sentence_id = sentence_id;
        }
        self.updated_at = Utc::now();
    }

    /// A failed task with a checkpoint can be resumed.
    pub fn can_resume(&self) -> bool {
        self.status == VideoTaskStatus::Failed && self.current_sentence_index.is_some()
    }

    /// Reset for retry; the checkpoint is preserved on purpose.
    pub fn reset_for_retry(&mut self) {
        self.status = VideoTaskStatus::Pending;
        self.progress = 0;
        self.error_message = None;
        self.error_sentence_id = None;
        self.updated_at = Utc::now();
    }

    /// Progress for the synthesis phase: `floor(done / total * 80)`.
    pub fn synthesis_progress(done: u32, total: u32) -> u8 {
        if total == 0 {
            return 0;
        }
        ((done as u64 * 80) / total as u64) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> VideoTask {
        VideoTask::new(
            UserId::new(),
            ProjectId::new(),
            ChapterId::new(),
            None,
            None,
            GenerationSettings::default(),
        )
    }

    #[test]
    fn progress_is_monotone() {
        let mut t = task();
        t.set_progress(40);
        t.set_progress(20);
        assert_eq!(t.progress, 40);
        t.set_progress(90);
        assert_eq!(t.progress, 90);
    }

    #[test]
    fn reset_preserves_checkpoint() {
        let mut t = task();
        t.set_status(VideoTaskStatus::SynthesizingVideos);
        t.set_checkpoint(5);
        t.mark_failed("ffmpeg exploded", Some(SentenceId::new()));
        assert!(t.can_resume());
        t.reset_for_retry();
        assert_eq!(t.status, VideoTaskStatus::Pending);
        assert_eq!(t.current_sentence_index, Some(5));
        assert!(t.error_message.is_none());
        assert!(t.error_sentence_id.is_none());
    }

    #[test]
    fn completion_clears_errors() {
        let mut t = task();
        t.mark_failed("transient", None);
        t.reset_for_retry();
        t.mark_completed("videos/u/20260801/final.mp4", 93);
        assert_eq!(t.status, VideoTaskStatus::Completed);
        assert_eq!(t.progress, 100);
        assert!(t.error_message.is_none());
        assert_eq!(t.video_duration, Some(93));
    }

    #[test]
    fn synthesis_progress_formula() {
        assert_eq!(VideoTask::synthesis_progress(0, 10), 0);
        assert_eq!(VideoTask::synthesis_progress(5, 10), 40);
        assert_eq!(VideoTask::synthesis_progress(10, 10), 80);
        assert_eq!(VideoTask::synthesis_progress(0, 0), 0);
    }

    #[test]
    fn checkpoint_never_regresses() {
        let mut t = task();
        t.set_checkpoint(7);
        t.set_checkpoint(3);
        assert_eq!(t.current_sentence_index, Some(7));
    }
}
