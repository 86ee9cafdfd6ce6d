//! Document parser binding.
//!
//! Segmentation is an external collaborator; the pipeline consumes only
//! its output contract (three parallel arrays in traversal order, counts
//! consistent). `HeuristicParser` is the default binding: chapter
//! headings, blank-line paragraphs, sentence-final punctuation.

use narravo_models::{
    ParsedChapter, ParsedDocument, ParsedParagraph, ParsedSentence, ParserOptions,
};

/// The segmentation contract consumed by the parse task.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, content: &str, options: &ParserOptions) -> ParsedDocument;
}

/// Characters that end a sentence.
const SENTENCE_ENDINGS: &[char] = &['。', '！', '？', '!', '?'];

/// Built-in heading/blank-line/punctuation segmenter.
#[derive(Debug, Default, Clone)]
pub struct HeuristicParser;

impl HeuristicParser {
    pub fn new() -> Self {
        Self
    }

    fn is_chapter_heading(line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || line.chars().count() > 40 {
            return false;
        }
        if line.starts_with('第') && (line.contains('章') || line.contains('回')) {
            return true;
        }
        line.starts_with("Chapter ") || line.starts_with("# ")
    }

    fn split_sentences(text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            current.push(c);
            if SENTENCE_ENDINGS.contains(&c) {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
        let trailing = current.trim();
        if !trailing.is_empty() {
            sentences.push(trailing.to_string());
        }
        sentences
    }

    fn word_count(text: &str) -> u32 {
        text.chars().filter(|c| !c.is_whitespace()).count() as u32
    }
}

/// A chapter under construction.
struct RawChapter {
    title: String,
    lines: Vec<String>,
}

impl DocumentParser for HeuristicParser {
    fn parse(&self, content: &str, options: &ParserOptions) -> ParsedDocument {
        // Pass 1: group lines into chapters at headings.
        let mut raw_chapters: Vec<RawChapter> = Vec::new();
        for line in content.lines() {
            if Self::is_chapter_heading(line) {
                raw_chapters.push(RawChapter {
                    title: line.trim().trim_start_matches("# ").to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
            if raw_chapters.is_empty() {
                raw_chapters.push(RawChapter {
                    title: "第一章".to_string(),
                    lines: Vec::new(),
                });
            }
            raw_chapters
                .last_mut()
                .expect("chapter exists")
                .lines
                .push(line.to_string());
        }

        // Pass 2: merge undersized chapters forward, keeping at least one.
        let mut merged: Vec<RawChapter> = Vec::new();
        for chapter in raw_chapters {
            let body_len: usize = chapter.lines.iter().map(|l| l.chars().count()).sum();
            match merged.last_mut() {
                Some(previous) if body_len < options.min_chapter_length => {
                    previous.lines.push(chapter.title.clone());
                    previous.lines.extend(chapter.lines);
                }
                _ => merged.push(chapter),
            }
        }
        // A single-chapter document is never merged away.
        let raw_chapters = if merged.is_empty() {
            vec![RawChapter {
                title: "第一章".to_string(),
                lines: vec![content.to_string()],
            }]
        } else {
            merged
        };

        // Pass 3: paragraphs at blank lines, sentences at final punctuation.
        let mut chapters = Vec::new();
        let mut paragraphs = Vec::new();
        let mut sentences = Vec::new();

        for (chapter_idx, raw) in raw_chapters.iter().enumerate() {
            let body = raw.lines.join("\n");
            let mut chapter_paragraphs = 0u32;
            let mut chapter_sentences = 0u32;

            for (paragraph_idx, block) in body
                .split("\n\n")
                .flat_map(|b| b.split('\n'))
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .enumerate()
            {
                let block_sentences = Self::split_sentences(block);
                if block_sentences.is_empty() {
                    continue;
                }

                for (sentence_idx, text) in block_sentences.iter().enumerate() {
                    sentences.push(ParsedSentence {
                        content: text.clone(),
                        order_index: sentence_idx as u32 + 1,
                        word_count: Self::word_count(text),
                    });
                }

                paragraphs.push(ParsedParagraph {
                    content: block.to_string(),
                    order_index: paragraph_idx as u32 + 1,
                    sentence_count: block_sentences.len() as u32,
                    word_count: Self::word_count(block),
                });
                chapter_paragraphs += 1;
                chapter_sentences += block_sentences.len() as u32;
            }

            chapters.push(ParsedChapter {
                title: raw.title.clone(),
                content: body.trim().to_string(),
                chapter_number: chapter_idx as u32 + 1,
                paragraph_count: chapter_paragraphs,
                sentence_count: chapter_sentences,
                word_count: Self::word_count(&body),
            });
        }

        ParsedDocument {
            chapters,
            paragraphs,
            sentences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ParsedDocument {
        let doc = HeuristicParser::new().parse(content, &ParserOptions::default());
        doc.validate().expect("parser output satisfies its contract");
        doc
    }

    #[test]
    fn tiny_document_is_one_chapter_one_paragraph_two_sentences() {
        let doc = parse("A。B。");
        assert_eq!(doc.chapters.len(), 1);
        assert_eq!(doc.paragraphs.len(), 1);
        assert_eq!(doc.sentences.len(), 2);
        assert_eq!(doc.sentences[0].content, "A。");
        assert_eq!(doc.sentences[1].content, "B。");
        assert_eq!(doc.chapters[0].paragraph_count, 1);
        assert_eq!(doc.paragraphs[0].sentence_count, 2);
    }

    #[test]
    fn headings_start_chapters() {
        let long_body = "他走了。".repeat(300);
        let content = format!("第一章 出发\n{long_body}\n第二章 归来\n{long_body}");
        let doc = parse(&content);
        assert_eq!(doc.chapters.len(), 2);
        assert_eq!(doc.chapters[0].title, "第一章 出发");
        assert_eq!(doc.chapters[1].chapter_number, 2);
    }

    #[test]
    fn short_chapters_merge_forward() {
        let long_body = "他走了。".repeat(300);
        let content = format!("第一章\n{long_body}\n第二章\n太短了。");
        let doc = parse(&content);
        assert_eq!(doc.chapters.len(), 1);
        assert!(doc.chapters[0].content.contains("太短了。"));
    }

    #[test]
    fn sentence_order_restarts_per_paragraph() {
        let doc = parse("A。B。\nC。");
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.sentences[2].order_index, 1);
    }

    #[test]
    fn trailing_text_without_punctuation_is_a_sentence() {
        let doc = parse("他走了。然后呢");
        assert_eq!(doc.sentences.len(), 2);
        assert_eq!(doc.sentences[1].content, "然后呢");
    }
}
