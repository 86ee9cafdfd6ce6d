//! LLM spell-correction for ASR transcripts.
//!
//! The model receives the original sentence text plus the recognized
//! timeline and may only fix misrecognized characters. Structure is
//! enforced on the way back in: timestamps always come from the original,
//! and a segment's word-level corrections are dropped wholesale when the
//! returned word count differs. A corrector failure is never fatal; the
//! original transcript is used instead.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use narravo_models::Transcript;
use narravo_provider::{ChatMessage, ChatOptions, ProviderGateway};

const SYSTEM_PROMPT: &str = "你是一个专业的字幕纠错助手。你的任务是纠正语音识别字幕中的错别字。

必须严格遵守的规则：
1. 对照原文，只修正字幕时间轴中每个segment的text字段里的错别字
2. 绝对不能删除、增加或重组任何词语，只能修正错别字
3. 必须保持相同的词数和顺序，即使某些词看起来奇怪也要保留
4. 保持JSON结构不变，只修改text和word字段中的错别字
5. 保持时间信息(start, end)完全不变
6. 如果有words字段，纠正其中的word字段，但不能改变words数组的长度
7. 只纠正明显的错别字（同音字、形近字），保持口语化特点
8. 不确定是否是错别字时，保持原样
9. 返回JSON格式：{\"segments\": [...纠正后的segments数组...]}";

/// Corrects transcripts through a chat model behind the provider gateway.
pub struct SubtitleCorrector {
    gateway: ProviderGateway,
    model: String,
}

#[derive(Debug, Serialize)]
struct TimelineSegment<'a> {
    index: usize,
    text: &'a str,
    start: f64,
    end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    words: Option<Vec<TimelineWord<'a>>>,
}

#[derive(Debug, Serialize)]
struct TimelineWord<'a> {
    word: &'a str,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct CorrectionReply {
    #[serde(default)]
    segments: Vec<CorrectedSegment>,
}

#[derive(Debug, Deserialize)]
struct CorrectedSegment {
    index: Option<usize>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Option<Vec<CorrectedWord>>,
}

#[derive(Debug, Deserialize)]
struct CorrectedWord {
    #[serde(default)]
    word: Option<String>,
}

impl SubtitleCorrector {
    pub fn new(gateway: ProviderGateway, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
        }
    }

    /// Correct a transcript against the sentence it narrates.
    ///
    /// Returns the original transcript untouched when the model reply is
    /// empty, unparseable, or fails validation everywhere.
    pub async fn correct(&self, transcript: &Transcript, original_text: &str) -> Transcript {
        if transcript.segments.is_empty() {
            return transcript.clone();
        }
        let recognized = transcript.full_text();
        if recognized.trim().is_empty() {
            return transcript.clone();
        }

        let timeline = self.timeline_json(transcript);
        let user_prompt = format!(
            "原文：\n{original_text}\n\n语音识别的字幕时间轴JSON：\n{timeline}\n\n\
             请纠正字幕时间轴中的错别字。\n\
             严格要求：\n\
             1. 每个segment的words数组长度必须与原始完全一致\n\
             2. 只修正明显的错别字，不改变词语\n\
             3. 不确定的保持原样\n\
             4. 返回前请验证词数是否一致\n\n\
             请返回纠正后的完整JSON。"
        );

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];
        let opts = ChatOptions {
            json_mode: true,
            ..Default::default()
        };

        let reply = match self.gateway.chat(&messages, &self.model, &opts).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(model = %self.model, "subtitle correction call failed, keeping original: {e}");
                return transcript.clone();
            }
        };
        if reply.message.trim().is_empty() {
            warn!("subtitle correction returned empty content, keeping original");
            return transcript.clone();
        }

        let parsed: CorrectionReply = match serde_json::from_str(&reply.message) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("subtitle correction returned unparseable JSON, keeping original: {e}");
                return transcript.clone();
            }
        };
        if parsed.segments.is_empty() {
            warn!("subtitle correction returned no segments, keeping original");
            return transcript.clone();
        }

        let corrected = apply_corrections(transcript, parsed);
        info!(model = %self.model, "subtitle timeline corrected");
        corrected
    }

    fn timeline_json(&self, transcript: &Transcript) -> String {
        let segments: Vec<TimelineSegment<'_>> = transcript
            .segments
            .iter()
            .enumerate()
            .map(|(index, seg)| TimelineSegment {
                index,
                text: &seg.text,
                start: seg.start,
                end: seg.end,
                words: seg.has_word_timing().then(|| {
                    seg.words
                        .iter()
                        .map(|w| TimelineWord {
                            word: &w.word,
                            start: w.start,
                            end: w.end,
                        })
                        .collect()
                }),
            })
            .collect();
        json!({ "segments": segments }).to_string()
    }
}

/// Apply a parsed correction reply with the structural gates.
fn apply_corrections(transcript: &Transcript, reply: CorrectionReply) -> Transcript {
    let mut result = transcript.clone();

    for corrected in reply.segments {
        let Some(index) = corrected.index else {
            continue;
        };
        let Some(segment) = result.segments.get_mut(index) else {
            continue;
        };

        if let Some(text) = corrected.text {
            let text = text.trim();
            if !text.is_empty() {
                segment.text = text.to_string();
            }
        }

        let Some(words) = corrected.words else {
            continue;
        };
        if segment.words.is_empty() {
            continue;
        }
        if words.len() != segment.words.len() {
            // A length drift would desynchronize the timeline; reject the
            // word-level correction and keep only the segment text change.
            warn!(
                segment = index,
                original = segment.words.len(),
                corrected = words.len(),
                "word count mismatch, rejecting per-word correction"
            );
            continue;
        }
        for (slot, corrected_word) in segment.words.iter_mut().zip(words) {
            if let Some(word) = corrected_word.word {
                if !word.is_empty() {
                    debug!(from = %slot.word, to = %word, "word corrected");
                    slot.word = word;
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use narravo_models::{TranscriptSegment, TranscriptWord};

    fn transcript() -> Transcript {
        Transcript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 2.0,
                text: "他望著远方".into(),
                words: vec![
                    TranscriptWord {
                        word: "他".into(),
                        start: 0.0,
                        end: 0.5,
                    },
                    TranscriptWord {
                        word: "望著".into(),
                        start: 0.5,
                        end: 1.2,
                    },
                    TranscriptWord {
                        word: "远方".into(),
                        start: 1.2,
                        end: 2.0,
                    },
                ],
            }],
            duration: 2.0,
        }
    }

    #[test]
    fn word_count_mismatch_keeps_original_words() {
        let original = transcript();
        let reply = CorrectionReply {
            segments: vec![CorrectedSegment {
                index: Some(0),
                text: Some("X".into()),
                words: Some(vec![
                    CorrectedWord {
                        word: Some("x".into()),
                    },
                    CorrectedWord {
                        word: Some("y".into()),
                    },
                ]),
            }],
        };

        let corrected = apply_corrections(&original, reply);
        // Segment text is applied, word array stays untouched.
        assert_eq!(corrected.segments[0].text, "X");
        assert_eq!(corrected.segments[0].words.len(), 3);
        assert_eq!(corrected.segments[0].words[1].word, "望著");
    }

    #[test]
    fn matching_word_count_applies_text_only() {
        let original = transcript();
        let reply = CorrectionReply {
            segments: vec![CorrectedSegment {
                index: Some(0),
                text: Some("他望着远方".into()),
                words: Some(vec![
                    CorrectedWord {
                        word: Some("他".into()),
                    },
                    CorrectedWord {
                        word: Some("望着".into()),
                    },
                    CorrectedWord {
                        word: Some("远方".into()),
                    },
                ]),
            }],
        };

        let corrected = apply_corrections(&original, reply);
        assert_eq!(corrected.segments[0].text, "他望着远方");
        assert_eq!(corrected.segments[0].words[1].word, "望着");
        // Timestamps come from the original.
        assert!((corrected.segments[0].words[1].start - 0.5).abs() < f64::EPSILON);
        assert!((corrected.segments[0].end - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let original = transcript();
        let reply = CorrectionReply {
            segments: vec![CorrectedSegment {
                index: Some(7),
                text: Some("junk".into()),
                words: None,
            }],
        };
        let corrected = apply_corrections(&original, reply);
        assert_eq!(corrected.segments[0].text, "他望著远方");
    }
}
