//! Chapter, paragraph and sentence repositories.
//!
//! Uniqueness lives in reserve-style indexes: `(project, chapter_number)`,
//! `(chapter, order_index)` and `(paragraph, order_index)` are claimed
//! before the document insert. Deleting a chapter cascades to paragraphs,
//! sentences and video tasks by explicit batch deletes; nothing relies on
//! referential constraints.

use narravo_models::{
    Chapter, ChapterId, ChapterStatus, Paragraph, ParagraphId, ProjectId, Sentence, SentenceId,
    VideoTask,
};
use tracing::info;

use crate::catalog::{Catalog, CHAPTERS, PARAGRAPHS, SENTENCES, VIDEO_TASKS};
use crate::error::{CatalogError, CatalogResult};

impl Catalog {
    // ------------------------------------------------------------------
    // Chapters
    // ------------------------------------------------------------------

    pub async fn insert_chapter(&self, chapter: &Chapter) -> CatalogResult<()> {
        let uniq = format!("uniq:chapter_number:{}", chapter.project_id);
        if !self
            .store()
            .index_add_nx(&uniq, &chapter.chapter_number.to_string())
            .await?
        {
            return Err(CatalogError::conflict(format!(
                "chapter number {} already exists in project {}",
                chapter.chapter_number, chapter.project_id
            )));
        }

        self.insert(CHAPTERS, chapter.id.as_str(), chapter).await?;
        self.store()
            .index_add(
                &format!("project:chapters:{}", chapter.project_id),
                chapter.id.as_str(),
            )
            .await?;
        Ok(())
    }

    pub async fn get_chapter(&self, id: &ChapterId) -> CatalogResult<Chapter> {
        Ok(self.load(CHAPTERS, "chapter", id.as_str()).await?.0)
    }

    pub async fn list_chapters(&self, project_id: &ProjectId) -> CatalogResult<Vec<Chapter>> {
        let ids = self
            .store()
            .index_members(&format!("project:chapters:{project_id}"))
            .await?;
        let mut chapters = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((chapter, _)) = self.try_load::<Chapter>(CHAPTERS, &id).await? {
                chapters.push(chapter);
            }
        }
        chapters.sort_by_key(|c| c.chapter_number);
        Ok(chapters)
    }

    /// Confirm a chapter, freezing its content.
    pub async fn confirm_chapter(&self, id: &ChapterId) -> CatalogResult<Chapter> {
        self.update(CHAPTERS, "chapter", id.as_str(), |c: &mut Chapter| {
            if c.is_confirmed {
                return Err(CatalogError::business_rule("chapter is already confirmed"));
            }
            c.confirm();
            Ok(())
        })
        .await
    }

    /// Advance chapter status; backward transitions are rejected.
    pub async fn advance_chapter_status(
        &self,
        id: &ChapterId,
        to: ChapterStatus,
    ) -> CatalogResult<Chapter> {
        self.update(CHAPTERS, "chapter", id.as_str(), |c: &mut Chapter| {
            if c.status == to {
                return Ok(());
            }
            if !c.status.can_advance_to(to) {
                return Err(CatalogError::business_rule(format!(
                    "illegal chapter transition {} -> {}",
                    c.status, to
                )));
            }
            c.status = to;
            Ok(())
        })
        .await
    }

    /// Record the finished chapter video and complete the chapter.
    pub async fn set_chapter_video(
        &self,
        id: &ChapterId,
        video_key: &str,
        duration: u32,
    ) -> CatalogResult<Chapter> {
        self.update(CHAPTERS, "chapter", id.as_str(), |c: &mut Chapter| {
            c.set_video(video_key, duration);
            Ok(())
        })
        .await
    }

    /// Explicit reset path out of `failed`.
    pub async fn reset_chapter_failed(&self, id: &ChapterId) -> CatalogResult<Chapter> {
        self.update(CHAPTERS, "chapter", id.as_str(), |c: &mut Chapter| {
            if c.status != ChapterStatus::Failed {
                return Err(CatalogError::business_rule(format!(
                    "only failed chapters can be reset, status is {}",
                    c.status
                )));
            }
            c.reset_failed();
            Ok(())
        })
        .await
    }

    /// Delete a chapter and everything under it.
    pub async fn delete_chapter(&self, id: &ChapterId) -> CatalogResult<()> {
        let chapter = self.get_chapter(id).await?;
        if chapter.is_confirmed {
            return Err(CatalogError::business_rule(
                "confirmed chapters cannot be deleted",
            ));
        }

        let paragraphs = self.list_paragraphs(id).await?;
        let mut deleted_sentences = 0usize;
        for paragraph in &paragraphs {
            let sentences = self.list_sentences(&paragraph.id).await?;
            for sentence in &sentences {
                self.store().delete(SENTENCES, sentence.id.as_str()).await?;
            }
            deleted_sentences += sentences.len();
            self.store()
                .delete(PARAGRAPHS, paragraph.id.as_str())
                .await?;
        }

        let task_ids = self
            .store()
            .index_members(&format!("chapter:video_tasks:{id}"))
            .await?;
        for task_id in &task_ids {
            self.store().delete(VIDEO_TASKS, task_id).await?;
        }

        self.store().delete(CHAPTERS, id.as_str()).await?;
        self.store()
            .index_remove(
                &format!("project:chapters:{}", chapter.project_id),
                id.as_str(),
            )
            .await?;
        self.store()
            .index_remove(
                &format!("uniq:chapter_number:{}", chapter.project_id),
                &chapter.chapter_number.to_string(),
            )
            .await?;

        info!(
            chapter = %id,
            paragraphs = paragraphs.len(),
            sentences = deleted_sentences,
            video_tasks = task_ids.len(),
            "chapter deleted with cascade"
        );
        Ok(())
    }

    /// Delete all content under a project (used before re-parsing).
    pub async fn delete_project_content(&self, project_id: &ProjectId) -> CatalogResult<u32> {
        let chapters = self.list_chapters(project_id).await?;
        let mut deleted = 0u32;
        for chapter in chapters {
            // Re-parsing replaces unconfirmed drafts wholesale; confirmed
            // chapters are frozen and survive.
            if chapter.is_confirmed {
                continue;
            }
            self.delete_chapter(&chapter.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // Paragraphs
    // ------------------------------------------------------------------

    /// Batch-insert paragraphs for one chapter.
    pub async fn insert_paragraphs(&self, paragraphs: &[Paragraph]) -> CatalogResult<()> {
        for paragraph in paragraphs {
            let uniq = format!("uniq:paragraph_order:{}", paragraph.chapter_id);
            if !self
                .store()
                .index_add_nx(&uniq, &paragraph.order_index.to_string())
                .await?
            {
                return Err(CatalogError::conflict(format!(
                    "paragraph order {} already exists in chapter {}",
                    paragraph.order_index, paragraph.chapter_id
                )));
            }
            self.insert(PARAGRAPHS, paragraph.id.as_str(), paragraph)
                .await?;
            self.store()
                .index_add(
                    &format!("chapter:paragraphs:{}", paragraph.chapter_id),
                    paragraph.id.as_str(),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_paragraph(&self, id: &ParagraphId) -> CatalogResult<Paragraph> {
        Ok(self.load(PARAGRAPHS, "paragraph", id.as_str()).await?.0)
    }

    pub async fn list_paragraphs(&self, chapter_id: &ChapterId) -> CatalogResult<Vec<Paragraph>> {
        let ids = self
            .store()
            .index_members(&format!("chapter:paragraphs:{chapter_id}"))
            .await?;
        let mut paragraphs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((paragraph, _)) = self.try_load::<Paragraph>(PARAGRAPHS, &id).await? {
                paragraphs.push(paragraph);
            }
        }
        paragraphs.sort_by_key(|p| p.order_index);
        Ok(paragraphs)
    }

    // ------------------------------------------------------------------
    // Sentences
    // ------------------------------------------------------------------

    /// Batch-insert sentences for one paragraph.
    pub async fn insert_sentences(&self, sentences: &[Sentence]) -> CatalogResult<()> {
        for sentence in sentences {
            let uniq = format!("uniq:sentence_order:{}", sentence.paragraph_id);
            if !self
                .store()
                .index_add_nx(&uniq, &sentence.order_index.to_string())
                .await?
            {
                return Err(CatalogError::conflict(format!(
                    "sentence order {} already exists in paragraph {}",
                    sentence.order_index, sentence.paragraph_id
                )));
            }
            self.insert(SENTENCES, sentence.id.as_str(), sentence).await?;
            self.store()
                .index_add(
                    &format!("paragraph:sentences:{}", sentence.paragraph_id),
                    sentence.id.as_str(),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_sentence(&self, id: &SentenceId) -> CatalogResult<Sentence> {
        Ok(self.load(SENTENCES, "sentence", id.as_str()).await?.0)
    }

    pub async fn list_sentences(&self, paragraph_id: &ParagraphId) -> CatalogResult<Vec<Sentence>> {
        let ids = self
            .store()
            .index_members(&format!("paragraph:sentences:{paragraph_id}"))
            .await?;
        let mut sentences = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((sentence, _)) = self.try_load::<Sentence>(SENTENCES, &id).await? {
                sentences.push(sentence);
            }
        }
        sentences.sort_by_key(|s| s.order_index);
        Ok(sentences)
    }

    /// All of a chapter's sentences in `(paragraph.order_index,
    /// sentence.order_index)` order - the order clips are concatenated in.
    pub async fn list_chapter_sentences(
        &self,
        chapter_id: &ChapterId,
    ) -> CatalogResult<Vec<Sentence>> {
        let paragraphs = self.list_paragraphs(chapter_id).await?;
        let mut sentences = Vec::new();
        for paragraph in paragraphs
            .iter()
            .filter(|p| p.action.participates_in_generation())
        {
            sentences.extend(self.list_sentences(&paragraph.id).await?);
        }
        Ok(sentences)
    }

    /// Generic sentence mutation (prompt/image/audio write-backs).
    pub async fn update_sentence<F>(&self, id: &SentenceId, mutate: F) -> CatalogResult<Sentence>
    where
        F: FnMut(&mut Sentence) -> CatalogResult<()>,
    {
        self.update(SENTENCES, "sentence", id.as_str(), mutate).await
    }

    /// True when every sentence of the chapter satisfies `predicate`.
    pub async fn all_chapter_sentences<F>(
        &self,
        chapter_id: &ChapterId,
        predicate: F,
    ) -> CatalogResult<bool>
    where
        F: Fn(&Sentence) -> bool,
    {
        let sentences = self.list_chapter_sentences(chapter_id).await?;
        Ok(!sentences.is_empty() && sentences.iter().all(predicate))
    }

    pub(crate) async fn index_video_task(&self, task: &VideoTask) -> CatalogResult<()> {
        self.store()
            .index_add(
                &format!("chapter:video_tasks:{}", task.chapter_id),
                task.id.as_str(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narravo_models::{GenerationSettings, ProjectFileType, Project, UserId, VideoTask};

    async fn seeded_catalog() -> (Catalog, Chapter, Vec<Sentence>) {
        let catalog = Catalog::in_memory("secret");
        let owner = UserId::new();
        let project = Project::new(
            owner.clone(),
            "novel",
            "novel.txt",
            1,
            ProjectFileType::Txt,
            "uploads/x",
            "hash",
        );
        catalog.create_project(&project).await.unwrap();

        let chapter = Chapter::new(project.id.clone(), "第一章", "A。B。", 1);
        catalog.insert_chapter(&chapter).await.unwrap();

        let paragraph = Paragraph::new(chapter.id.clone(), 1, "A。B。");
        catalog.insert_paragraphs(&[paragraph.clone()]).await.unwrap();

        let sentences = vec![
            Sentence::new(paragraph.id.clone(), 1, "A。"),
            Sentence::new(paragraph.id.clone(), 2, "B。"),
        ];
        catalog.insert_sentences(&sentences).await.unwrap();

        (catalog, chapter, sentences)
    }

    #[tokio::test]
    async fn chapter_number_is_unique_per_project() {
        let (catalog, chapter, _) = seeded_catalog().await;
        let dup = Chapter::new(chapter.project_id.clone(), "重复", "x", 1);
        let err = catalog.insert_chapter(&dup).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn sentence_order_is_unique_per_paragraph() {
        let (catalog, _, sentences) = seeded_catalog().await;
        let dup = Sentence::new(sentences[0].paragraph_id.clone(), 1, "C。");
        let err = catalog.insert_sentences(&[dup]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn backward_chapter_transition_is_rejected() {
        let (catalog, chapter, _) = seeded_catalog().await;
        catalog.confirm_chapter(&chapter.id).await.unwrap();
        catalog
            .advance_chapter_status(&chapter.id, ChapterStatus::GeneratingPrompts)
            .await
            .unwrap();
        catalog
            .advance_chapter_status(&chapter.id, ChapterStatus::GeneratedPrompts)
            .await
            .unwrap();

        let err = catalog
            .advance_chapter_status(&chapter.id, ChapterStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn confirm_twice_is_rejected() {
        let (catalog, chapter, _) = seeded_catalog().await;
        catalog.confirm_chapter(&chapter.id).await.unwrap();
        let err = catalog.confirm_chapter(&chapter.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn chapter_sentences_follow_paragraph_then_sentence_order() {
        let (catalog, chapter, _) = seeded_catalog().await;

        let para2 = Paragraph::new(chapter.id.clone(), 2, "C。");
        catalog.insert_paragraphs(&[para2.clone()]).await.unwrap();
        catalog
            .insert_sentences(&[Sentence::new(para2.id.clone(), 1, "C。")])
            .await
            .unwrap();

        let ordered = catalog.list_chapter_sentences(&chapter.id).await.unwrap();
        let texts: Vec<&str> = ordered.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(texts, vec!["A。", "B。", "C。"]);
    }

    #[tokio::test]
    async fn delete_chapter_cascades() {
        let (catalog, chapter, sentences) = seeded_catalog().await;

        let task = VideoTask::new(
            UserId::new(),
            chapter.project_id.clone(),
            chapter.id.clone(),
            None,
            None,
            GenerationSettings::default(),
        );
        catalog.insert_video_task(&task).await.unwrap();

        catalog.delete_chapter(&chapter.id).await.unwrap();

        assert!(catalog.get_chapter(&chapter.id).await.is_err());
        assert!(catalog.get_sentence(&sentences[0].id).await.is_err());
        assert!(catalog.get_video_task(&task.id).await.is_err());

        // The chapter number slot is free again.
        let again = Chapter::new(chapter.project_id.clone(), "重建", "x", 1);
        catalog.insert_chapter(&again).await.unwrap();
    }

    #[tokio::test]
    async fn confirmed_chapters_cannot_be_deleted() {
        let (catalog, chapter, _) = seeded_catalog().await;
        catalog.confirm_chapter(&chapter.id).await.unwrap();
        let err = catalog.delete_chapter(&chapter.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn material_predicate_sees_all_sentences() {
        let (catalog, chapter, sentences) = seeded_catalog().await;

        assert!(!catalog
            .all_chapter_sentences(&chapter.id, |s| s.is_ready_for_video())
            .await
            .unwrap());

        for s in &sentences {
            catalog
                .update_sentence(&s.id, |row| {
                    row.set_image_key("images/u/20260801/i.png");
                    row.set_audio_key("audio/u/20260801/a.mp3");
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert!(catalog
            .all_chapter_sentences(&chapter.id, |s| s.is_ready_for_video())
            .await
            .unwrap());
    }
}
