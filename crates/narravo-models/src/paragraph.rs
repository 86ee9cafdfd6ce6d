//! Paragraph model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{ChapterId, ParagraphId};

/// What the user decided to do with a paragraph.
///
/// Only `Keep` and `Edit` paragraphs participate in generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphAction {
    #[default]
    Keep,
    Edit,
    Delete,
    Ignore,
}

impl ParagraphAction {
    pub fn participates_in_generation(&self) -> bool {
        matches!(self, ParagraphAction::Keep | ParagraphAction::Edit)
    }
}

/// One paragraph of a chapter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Paragraph {
    pub id: ParagraphId,
    pub chapter_id: ChapterId,
    /// 1-based, unique per chapter.
    pub order_index: u32,
    pub content: String,
    pub word_count: u32,
    pub sentence_count: u32,
    pub action: ParagraphAction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Paragraph {
    pub fn new(chapter_id: ChapterId, order_index: u32, content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: ParagraphId::new(),
            chapter_id,
            order_index,
            word_count: content.chars().filter(|c| !c.is_whitespace()).count() as u32,
            sentence_count: 0,
            content,
            action: ParagraphAction::Keep,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_keep_and_edit_generate() {
        assert!(ParagraphAction::Keep.participates_in_generation());
        assert!(ParagraphAction::Edit.participates_in_generation());
        assert!(!ParagraphAction::Delete.participates_in_generation());
        assert!(!ParagraphAction::Ignore.participates_in_generation());
    }

    #[test]
    fn word_count_ignores_whitespace() {
        let p = Paragraph::new(ChapterId::new(), 1, "他 望着 远方。");
        assert_eq!(p.word_count, 6);
    }
}
