//! FFmpeg composition for Narravo.
//!
//! Two jobs: render one still image + one voice-over + subtitle overlays
//! into a per-sentence clip, and concatenate finished clips into the
//! chapter video under stream copy. FFmpeg and ffprobe are external
//! dependencies located on PATH; no in-process codec is assumed.

pub mod command;
pub mod compose;
pub mod concat;
pub mod error;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{build_sentence_clip_command, SentenceClipSpec};
pub use concat::{concat_clips, write_concat_manifest};
pub use error::{MediaError, MediaResult};
pub use probe::media_duration;

/// Timeout for one sentence clip render.
pub const SENTENCE_CLIP_TIMEOUT_SECS: u64 = 300;
/// Timeout for the final concat.
pub const CONCAT_TIMEOUT_SECS: u64 = 600;
