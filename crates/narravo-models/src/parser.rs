//! Output contract of the external text-segmentation parser.
//!
//! The parser returns three parallel arrays in traversal order. The counts
//! must line up: the sum of `paragraph_count` over chapters equals the
//! number of paragraphs, and the sum of `sentence_count` over paragraphs
//! equals the number of sentences. Consumers validate this before
//! persisting anything.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Options passed to the parser.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParserOptions {
    /// Chapters shorter than this many characters are merged forward.
    pub min_chapter_length: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            min_chapter_length: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParsedChapter {
    pub title: String,
    pub content: String,
    /// 1-based chapter number in document order.
    pub chapter_number: u32,
    pub paragraph_count: u32,
    pub sentence_count: u32,
    pub word_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParsedParagraph {
    pub content: String,
    /// 1-based index within its chapter.
    pub order_index: u32,
    pub sentence_count: u32,
    pub word_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParsedSentence {
    pub content: String,
    /// 1-based index within its paragraph.
    pub order_index: u32,
    pub word_count: u32,
}

/// The parser's complete output for one document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParsedDocument {
    pub chapters: Vec<ParsedChapter>,
    pub paragraphs: Vec<ParsedParagraph>,
    pub sentences: Vec<ParsedSentence>,
}

impl ParsedDocument {
    /// Check the parallel-array invariants.
    pub fn validate(&self) -> Result<(), String> {
        let para_sum: u32 = self.chapters.iter().map(|c| c.paragraph_count).sum();
        if para_sum as usize != self.paragraphs.len() {
            return Err(format!(
                "paragraph counts disagree: chapters claim {}, got {}",
                para_sum,
                self.paragraphs.len()
            ));
        }
        let sent_sum: u32 = self.paragraphs.iter().map(|p| p.sentence_count).sum();
        if sent_sum as usize != self.sentences.len() {
            return Err(format!(
                "sentence counts disagree: paragraphs claim {}, got {}",
                sent_sum,
                self.sentences.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_consistent_output() {
        let doc = ParsedDocument {
            chapters: vec![ParsedChapter {
                title: "第一章".into(),
                content: "A。B。".into(),
                chapter_number: 1,
                paragraph_count: 1,
                sentence_count: 2,
                word_count: 2,
            }],
            paragraphs: vec![ParsedParagraph {
                content: "A。B。".into(),
                order_index: 1,
                sentence_count: 2,
                word_count: 2,
            }],
            sentences: vec![
                ParsedSentence {
                    content: "A。".into(),
                    order_index: 1,
                    word_count: 1,
                },
                ParsedSentence {
                    content: "B。".into(),
                    order_index: 2,
                    word_count: 1,
                },
            ],
        };
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn validate_rejects_mismatched_counts() {
        let doc = ParsedDocument {
            chapters: vec![ParsedChapter {
                title: "第一章".into(),
                content: "A。".into(),
                chapter_number: 1,
                paragraph_count: 2,
                sentence_count: 1,
                word_count: 1,
            }],
            paragraphs: vec![ParsedParagraph {
                content: "A。".into(),
                order_index: 1,
                sentence_count: 1,
                word_count: 1,
            }],
            sentences: vec![ParsedSentence {
                content: "A。".into(),
                order_index: 1,
                word_count: 1,
            }],
        };
        assert!(doc.validate().is_err());
    }
}
