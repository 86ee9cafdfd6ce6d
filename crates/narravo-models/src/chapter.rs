//! Chapter model and its forward-only status machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{ChapterId, ProjectId};

/// Chapter generation status.
///
/// Transitions are monotone forward along `rank()`; the single exception is
/// `Failed -> Pending` via an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    /// Editable; not yet confirmed by the user
    #[default]
    Pending,
    /// Frozen; paragraphs and sentences are immutable from here on
    Confirmed,
    /// Prompt stage running
    GeneratingPrompts,
    /// Every sentence has an image prompt
    GeneratedPrompts,
    /// Every sentence has both image and audio
    MaterialsPrepared,
    /// A video task is synthesizing this chapter
    GeneratingVideo,
    /// Chapter video recorded
    Completed,
    /// A stage or video task failed
    Failed,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Confirmed => "confirmed",
            ChapterStatus::GeneratingPrompts => "generating_prompts",
            ChapterStatus::GeneratedPrompts => "generated_prompts",
            ChapterStatus::MaterialsPrepared => "materials_prepared",
            ChapterStatus::GeneratingVideo => "generating_video",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ChapterStatus::Pending => 0,
            ChapterStatus::Confirmed => 1,
            ChapterStatus::GeneratingPrompts => 2,
            ChapterStatus::GeneratedPrompts => 3,
            ChapterStatus::MaterialsPrepared => 4,
            ChapterStatus::GeneratingVideo => 5,
            ChapterStatus::Completed => 6,
            ChapterStatus::Failed => 7,
        }
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// `Failed` is reachable from any state; leaving `Failed` requires the
    /// explicit reset path back to `Pending`.
    pub fn can_advance_to(&self, to: ChapterStatus) -> bool {
        if to == ChapterStatus::Failed {
            return true;
        }
        if *self == ChapterStatus::Failed {
            return to == ChapterStatus::Pending;
        }
        to.rank() > self.rank()
    }
}

impl std::fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chapter of a parsed document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Chapter {
    pub id: ChapterId,
    pub project_id: ProjectId,
    pub title: String,
    pub content: String,
    /// 1-based, unique per project.
    pub chapter_number: u32,
    pub word_count: u32,
    pub paragraph_count: u32,
    pub sentence_count: u32,
    pub status: ChapterStatus,
    pub is_confirmed: bool,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Object-store key of the finished chapter video.
    #[serde(default)]
    pub video_key: Option<String>,
    #[serde(default)]
    pub video_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    pub fn new(
        project_id: ProjectId,
        title: impl Into<String>,
        content: impl Into<String>,
        chapter_number: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ChapterId::new(),
            project_id,
            title: title.into(),
            content: content.into(),
            chapter_number,
            word_count: 0,
            paragraph_count: 0,
            sentence_count: 0,
            status: ChapterStatus::Pending,
            is_confirmed: false,
            confirmed_at: None,
            video_key: None,
            video_duration: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Freeze the chapter. Idempotence is rejected upstream; this only
    /// flips the flags.
    pub fn confirm(&mut self) {
        self.is_confirmed = true;
        self.status = ChapterStatus::Confirmed;
        self.confirmed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record the finished video for this chapter.
    pub fn set_video(&mut self, key: impl Into<String>, duration: u32) {
        self.video_key = Some(key.into());
        self.video_duration = Some(duration);
        self.status = ChapterStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Explicit reset path out of `Failed`.
    pub fn reset_failed(&mut self) {
        self.status = ChapterStatus::Pending;
        self.is_confirmed = false;
        self.confirmed_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_never_moves_backward() {
        assert!(ChapterStatus::Confirmed.can_advance_to(ChapterStatus::GeneratingPrompts));
        assert!(ChapterStatus::GeneratingPrompts.can_advance_to(ChapterStatus::GeneratedPrompts));
        assert!(!ChapterStatus::Completed.can_advance_to(ChapterStatus::GeneratingPrompts));
        assert!(!ChapterStatus::MaterialsPrepared.can_advance_to(ChapterStatus::Confirmed));
    }

    #[test]
    fn failed_is_reachable_and_resets_to_pending_only() {
        assert!(ChapterStatus::GeneratingVideo.can_advance_to(ChapterStatus::Failed));
        assert!(ChapterStatus::Failed.can_advance_to(ChapterStatus::Pending));
        assert!(!ChapterStatus::Failed.can_advance_to(ChapterStatus::Confirmed));
    }

    #[test]
    fn confirm_sets_flag_and_timestamp() {
        let mut ch = Chapter::new(ProjectId::new(), "一", "正文", 1);
        assert!(!ch.is_confirmed);
        ch.confirm();
        assert!(ch.is_confirmed);
        assert_eq!(ch.status, ChapterStatus::Confirmed);
        assert!(ch.confirmed_at.is_some());
    }
}
