//! Sentence model - the smallest unit of video generation.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{ParagraphId, SentenceId};

/// Sentence processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SentenceStatus {
    #[default]
    Pending,
    Processing,
    /// Image prompt written
    GeneratedPrompts,
    Completed,
    Failed,
}

impl SentenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentenceStatus::Pending => "pending",
            SentenceStatus::Processing => "processing",
            SentenceStatus::GeneratedPrompts => "generated_prompts",
            SentenceStatus::Completed => "completed",
            SentenceStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SentenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Voice synthesis parameters for one sentence.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VoiceSettings {
    #[serde(default)]
    pub voice_type: Option<String>,
    #[serde(default = "default_rate")]
    pub speech_rate: f64,
    #[serde(default = "default_rate")]
    pub pitch: f64,
    #[serde(default = "default_rate")]
    pub volume: f64,
}

fn default_rate() -> f64 {
    1.0
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_type: None,
            speech_rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// One sentence and its generated materials.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Sentence {
    pub id: SentenceId,
    pub paragraph_id: ParagraphId,
    /// 1-based, unique per paragraph.
    pub order_index: u32,
    pub content: String,
    pub word_count: u32,
    pub character_count: u32,

    /// Prompt used for image generation. Must be set before `image_url`.
    #[serde(default)]
    pub image_prompt: Option<String>,
    /// Object-store key of the generated image (never a presigned URL).
    #[serde(default)]
    pub image_url: Option<String>,
    /// Object-store key of the synthesized voice-over.
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Timeline slot inside the chapter video, filled during synthesis.
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub voice: VoiceSettings,

    pub status: SentenceStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    pub retry_count: u32,

    #[serde(default)]
    pub edited_content: Option<String>,
    #[serde(default)]
    pub is_manual_edited: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sentence {
    pub fn new(paragraph_id: ParagraphId, order_index: u32, content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: SentenceId::new(),
            paragraph_id,
            order_index,
            word_count: content.chars().filter(|c| !c.is_whitespace()).count() as u32,
            character_count: content.chars().count() as u32,
            content,
            image_prompt: None,
            image_url: None,
            audio_url: None,
            start_time: None,
            end_time: None,
            duration: None,
            voice: VoiceSettings::default(),
            status: SentenceStatus::Pending,
            error_message: None,
            retry_count: 0,
            edited_content: None,
            is_manual_edited: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The text actually narrated and subtitled.
    pub fn effective_content(&self) -> &str {
        self.edited_content.as_deref().unwrap_or(&self.content)
    }

    /// A sentence can enter video synthesis once both materials exist.
    pub fn is_ready_for_video(&self) -> bool {
        self.image_url.is_some() && self.audio_url.is_some()
    }

    pub fn set_image_prompt(&mut self, prompt: impl Into<String>) {
        self.image_prompt = Some(prompt.into());
        self.status = SentenceStatus::GeneratedPrompts;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn set_image_key(&mut self, key: impl Into<String>) {
        self.image_url = Some(key.into());
        if self.is_ready_for_video() {
            self.status = SentenceStatus::Completed;
        }
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn set_audio_key(&mut self, key: impl Into<String>) {
        self.audio_url = Some(key.into());
        if self.is_ready_for_video() {
            self.status = SentenceStatus::Completed;
        }
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SentenceStatus::Failed;
        self.error_message = Some(error.into());
        self.retry_count += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence() -> Sentence {
        Sentence::new(ParagraphId::new(), 1, "他望着远方。")
    }

    #[test]
    fn ready_for_video_requires_both_materials() {
        let mut s = sentence();
        assert!(!s.is_ready_for_video());
        s.set_image_key("images/u/20260801/a.png");
        assert!(!s.is_ready_for_video());
        assert_eq!(s.status, SentenceStatus::Pending);
        s.set_audio_key("audio/u/20260801/a.mp3");
        assert!(s.is_ready_for_video());
        assert_eq!(s.status, SentenceStatus::Completed);
    }

    #[test]
    fn failure_increments_retry_count() {
        let mut s = sentence();
        s.mark_failed("provider exhausted");
        s.mark_failed("still exhausted");
        assert_eq!(s.retry_count, 2);
        assert_eq!(s.status, SentenceStatus::Failed);
    }

    #[test]
    fn edited_content_wins() {
        let mut s = sentence();
        assert_eq!(s.effective_content(), "他望着远方。");
        s.edited_content = Some("他凝望远方。".into());
        s.is_manual_edited = true;
        assert_eq!(s.effective_content(), "他凝望远方。");
    }
}
