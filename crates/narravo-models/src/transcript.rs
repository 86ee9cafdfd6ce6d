//! ASR transcript types with word-level timing.
//!
//! Timestamps are seconds as floats, relative to the start of the audio
//! file that was transcribed.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One recognized word with its time span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// One recognized segment (a clause or short sentence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Word-level timing; empty when the recognizer produced none.
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
}

impl TranscriptSegment {
    pub fn has_word_timing(&self) -> bool {
        !self.words.is_empty()
    }
}

/// A full transcript of one audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    /// Audio duration in seconds.
    pub duration: f64,
}

impl Transcript {
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            duration: 0.0,
        }
    }

    /// Concatenated segment text.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_text_joins_segments() {
        let t = Transcript {
            segments: vec![
                TranscriptSegment {
                    start: 0.0,
                    end: 1.0,
                    text: " 他望着远方 ".into(),
                    words: vec![],
                },
                TranscriptSegment {
                    start: 1.0,
                    end: 2.0,
                    text: "一言不发".into(),
                    words: vec![],
                },
            ],
            duration: 2.0,
        };
        assert_eq!(t.full_text(), "他望着远方 一言不发");
    }

    #[test]
    fn segment_word_timing_flag() {
        let mut seg = TranscriptSegment {
            start: 0.0,
            end: 1.0,
            text: "你好".into(),
            words: vec![],
        };
        assert!(!seg.has_word_timing());
        seg.words.push(TranscriptWord {
            word: "你好".into(),
            start: 0.0,
            end: 1.0,
        });
        assert!(seg.has_word_timing());
    }
}
