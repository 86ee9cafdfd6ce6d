//! Shared data models for the Narravo backend.
//!
//! This crate provides Serde-serializable types for:
//! - Entity ids and timestamps
//! - Projects, chapters, paragraphs and sentences (the text hierarchy)
//! - API keys and provider kinds
//! - Video tasks and their state machine
//! - Generation settings (resolution, codecs, subtitle style)
//! - Transcripts with word-level timing
//! - The document-parser output contract
//! - WebSocket message schemas

pub mod api_key;
pub mod chapter;
pub mod id;
pub mod paragraph;
pub mod parser;
pub mod project;
pub mod sentence;
pub mod settings;
pub mod transcript;
pub mod video_task;
pub mod ws;

pub use api_key::{ApiKey, ApiKeyStatus, ProviderKind};
pub use chapter::{Chapter, ChapterStatus};
pub use id::{ApiKeyId, ChapterId, ParagraphId, ProjectId, SentenceId, TaskId, UserId, VideoTaskId};
pub use paragraph::{Paragraph, ParagraphAction};
pub use parser::{ParsedChapter, ParsedDocument, ParsedParagraph, ParsedSentence, ParserOptions};
pub use project::{Project, ProjectFileType, ProjectStatus};
pub use sentence::{Sentence, SentenceStatus, VoiceSettings};
pub use settings::{GenerationSettings, SubtitleStyle};
pub use transcript::{Transcript, TranscriptSegment, TranscriptWord};
pub use video_task::{VideoTask, VideoTaskStatus};
pub use ws::{WsClientMessage, WsServerMessage};
