//! Subtitle pipeline errors.

use std::path::PathBuf;
use thiserror::Error;

pub type SubtitleResult<T> = Result<T, SubtitleError>;

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("audio file not found: {0}")]
    AudioNotFound(PathBuf),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("unparseable transcription response: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
