//! Subtitle pipeline: transcription, LLM spell-correction, and the
//! deterministic overlay renderer.
//!
//! The pipeline is strict about timing: correction may only change text,
//! never timestamps or word counts, and the renderer is a pure function of
//! the corrected transcript plus a layout.

pub mod corrector;
pub mod error;
pub mod renderer;
pub mod simplified;
pub mod transcriber;

pub use corrector::SubtitleCorrector;
pub use error::{SubtitleError, SubtitleResult};
pub use renderer::{drawtext_filter, render_overlays, OverlayCommand, SubtitleLayout};
pub use simplified::to_simplified;
pub use transcriber::{Transcriber, WhisperApiTranscriber};
