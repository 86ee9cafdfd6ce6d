//! Transcription client.
//!
//! The Whisper model itself is an external collaborator reached over an
//! OpenAI-compatible `audio/transcriptions` endpoint; this module defines
//! the trait the pipeline consumes and the HTTP client implementation.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use narravo_models::{Transcript, TranscriptSegment, TranscriptWord};

use crate::error::{SubtitleError, SubtitleResult};
use crate::simplified::to_simplified;

/// Produces segment- and word-level timestamps from an audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> SubtitleResult<Transcript>;

    fn name(&self) -> &'static str;
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "whisper-1";

/// HTTP client for an OpenAI-compatible transcription endpoint.
pub struct WhisperApiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: String,
}

impl WhisperApiTranscriber {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            language: "zh".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    async fn build_form(&self, audio_path: &Path) -> SubtitleResult<Form> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let mime = match audio_path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(bytes).file_name(file_name).mime_str(mime)?;

        Ok(Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("timestamp_granularities[]", "word"))
    }
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawWord {
    word: String,
    start: f64,
    end: f64,
}

/// Fold the flat word array into the segments that contain them.
///
/// Verbose JSON reports words separately from segments; a word belongs to
/// the segment whose span covers its start time. Words past the last
/// segment end stay with the last segment.
fn assemble(raw: VerboseTranscription) -> Transcript {
    let mut segments: Vec<TranscriptSegment> = raw
        .segments
        .iter()
        .map(|s| TranscriptSegment {
            start: s.start,
            end: s.end,
            text: to_simplified(s.text.trim()),
            words: Vec::new(),
        })
        .collect();

    if segments.is_empty() && !raw.words.is_empty() {
        let start = raw.words.first().map(|w| w.start).unwrap_or(0.0);
        let end = raw.words.last().map(|w| w.end).unwrap_or(0.0);
        let text: String = raw.words.iter().map(|w| w.word.as_str()).collect();
        segments.push(TranscriptSegment {
            start,
            end,
            text: to_simplified(&text),
            words: Vec::new(),
        });
    }

    let mut seg_idx = 0usize;
    for word in &raw.words {
        while seg_idx + 1 < segments.len() && word.start >= segments[seg_idx].end {
            seg_idx += 1;
        }
        if let Some(segment) = segments.get_mut(seg_idx) {
            segment.words.push(TranscriptWord {
                word: to_simplified(&word.word),
                start: word.start,
                end: word.end,
            });
        }
    }

    let duration = raw
        .duration
        .or_else(|| segments.last().map(|s| s.end))
        .unwrap_or(0.0);

    Transcript { segments, duration }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> SubtitleResult<Transcript> {
        if !audio_path.exists() {
            return Err(SubtitleError::AudioNotFound(audio_path.to_path_buf()));
        }

        let form = self.build_form(audio_path).await?;
        debug!(path = %audio_path.display(), model = %self.model, "transcribing audio");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let summary: String = body.chars().take(300).collect();
            return Err(SubtitleError::Transcription(format!("HTTP {status}: {summary}")));
        }

        let raw: VerboseTranscription = serde_json::from_str(&body)
            .map_err(|e| SubtitleError::InvalidResponse(e.to_string()))?;
        Ok(assemble(raw))
    }

    fn name(&self) -> &'static str {
        "whisper_api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_land_in_their_segments() {
        let raw = VerboseTranscription {
            duration: Some(4.0),
            segments: vec![
                RawSegment {
                    start: 0.0,
                    end: 2.0,
                    text: "他望着远方".into(),
                },
                RawSegment {
                    start: 2.0,
                    end: 4.0,
                    text: "一言不发".into(),
                },
            ],
            words: vec![
                RawWord {
                    word: "他".into(),
                    start: 0.0,
                    end: 0.5,
                },
                RawWord {
                    word: "望着".into(),
                    start: 0.5,
                    end: 1.2,
                },
                RawWord {
                    word: "远方".into(),
                    start: 1.2,
                    end: 1.9,
                },
                RawWord {
                    word: "一言不发".into(),
                    start: 2.1,
                    end: 3.8,
                },
            ],
        };

        let transcript = assemble(raw);
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].words.len(), 3);
        assert_eq!(transcript.segments[1].words.len(), 1);
        assert!((transcript.duration - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn traditional_text_is_folded() {
        let raw = VerboseTranscription {
            duration: None,
            segments: vec![RawSegment {
                start: 0.0,
                end: 1.0,
                text: "他望著遠方".into(),
            }],
            words: vec![],
        };
        let transcript = assemble(raw);
        assert_eq!(transcript.segments[0].text, "他望着远方");
        assert!((transcript.duration - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn words_without_segments_make_one_segment() {
        let raw = VerboseTranscription {
            duration: None,
            segments: vec![],
            words: vec![
                RawWord {
                    word: "你好".into(),
                    start: 0.0,
                    end: 0.8,
                },
                RawWord {
                    word: "世界".into(),
                    start: 0.8,
                    end: 1.5,
                },
            ],
        };
        let transcript = assemble(raw);
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].words.len(), 2);
        assert_eq!(transcript.segments[0].text, "你好世界");
    }

    #[tokio::test]
    async fn missing_audio_file_is_reported() {
        let t = WhisperApiTranscriber::new("key");
        let err = t.transcribe(Path::new("/nope/missing.mp3")).await.unwrap_err();
        assert!(matches!(err, SubtitleError::AudioNotFound(_)));
    }
}
