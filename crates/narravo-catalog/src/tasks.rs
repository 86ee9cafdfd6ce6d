//! Video-task repository.

use narravo_models::{SentenceId, VideoTask, VideoTaskId, VideoTaskStatus};

use crate::catalog::{Catalog, VIDEO_TASKS};
use crate::error::{CatalogError, CatalogResult};

impl Catalog {
    pub async fn insert_video_task(&self, task: &VideoTask) -> CatalogResult<()> {
        self.insert(VIDEO_TASKS, task.id.as_str(), task).await?;
        self.index_video_task(task).await?;
        self.store()
            .index_add(&format!("user:video_tasks:{}", task.user_id), task.id.as_str())
            .await?;
        Ok(())
    }

    pub async fn get_video_task(&self, id: &VideoTaskId) -> CatalogResult<VideoTask> {
        Ok(self.load(VIDEO_TASKS, "video_task", id.as_str()).await?.0)
    }

    pub async fn update_video_task<F>(
        &self,
        id: &VideoTaskId,
        mutate: F,
    ) -> CatalogResult<VideoTask>
    where
        F: FnMut(&mut VideoTask) -> CatalogResult<()>,
    {
        self.update(VIDEO_TASKS, "video_task", id.as_str(), mutate)
            .await
    }

    pub async fn set_video_task_status(
        &self,
        id: &VideoTaskId,
        status: VideoTaskStatus,
    ) -> CatalogResult<VideoTask> {
        self.update_video_task(id, |t| {
            t.set_status(status);
            Ok(())
        })
        .await
    }

    pub async fn set_video_task_progress(
        &self,
        id: &VideoTaskId,
        progress: u8,
    ) -> CatalogResult<VideoTask> {
        self.update_video_task(id, |t| {
            t.set_progress(progress);
            Ok(())
        })
        .await
    }

    /// Record the synthesis checkpoint: last fully materialized sentence
    /// index and the derived progress.
    pub async fn video_task_checkpoint(
        &self,
        id: &VideoTaskId,
        sentence_index: u32,
        progress: u8,
    ) -> CatalogResult<VideoTask> {
        self.update_video_task(id, |t| {
            t.set_checkpoint(sentence_index);
            t.set_progress(progress);
            Ok(())
        })
        .await
    }

    pub async fn complete_video_task(
        &self,
        id: &VideoTaskId,
        video_key: &str,
        duration: u32,
    ) -> CatalogResult<VideoTask> {
        self.update_video_task(id, |t| {
            t.mark_completed(video_key, duration);
            Ok(())
        })
        .await
    }

    pub async fn fail_video_task(
        &self,
        id: &VideoTaskId,
        error: &str,
        sentence_id: Option<SentenceId>,
    ) -> CatalogResult<VideoTask> {
        let sentence_id_for_update = sentence_id;
        self.update_video_task(id, move |t| {
            t.mark_failed(error, sentence_id_for_update.clone());
            Ok(())
        })
        .await
    }

    /// Reset a failed task for retry, preserving the checkpoint.
    pub async fn reset_video_task_for_retry(&self, id: &VideoTaskId) -> CatalogResult<VideoTask> {
        self.update_video_task(id, |t| {
            if t.status != VideoTaskStatus::Failed {
                return Err(CatalogError::business_rule(format!(
                    "only failed video tasks can be retried, status is {}",
                    t.status
                )));
            }
            t.reset_for_retry();
            Ok(())
        })
        .await
    }

    /// Delete a task; in-flight tasks are protected.
    pub async fn delete_video_task(&self, id: &VideoTaskId) -> CatalogResult<()> {
        let task = self.get_video_task(id).await?;
        if task.status.is_in_flight() {
            return Err(CatalogError::business_rule(
                "a running video task cannot be deleted",
            ));
        }
        self.store().delete(VIDEO_TASKS, id.as_str()).await?;
        self.store()
            .index_remove(
                &format!("chapter:video_tasks:{}", task.chapter_id),
                id.as_str(),
            )
            .await?;
        self.store()
            .index_remove(&format!("user:video_tasks:{}", task.user_id), id.as_str())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narravo_models::{ChapterId, GenerationSettings, ProjectId, UserId};

    fn task() -> VideoTask {
        VideoTask::new(
            UserId::new(),
            ProjectId::new(),
            ChapterId::new(),
            None,
            None,
            GenerationSettings::default(),
        )
    }

    #[tokio::test]
    async fn checkpoint_and_progress_are_persisted() {
        let catalog = Catalog::in_memory("secret");
        let t = task();
        catalog.insert_video_task(&t).await.unwrap();

        catalog
            .set_video_task_status(&t.id, VideoTaskStatus::SynthesizingVideos)
            .await
            .unwrap();
        catalog.video_task_checkpoint(&t.id, 3, 32).await.unwrap();

        let loaded = catalog.get_video_task(&t.id).await.unwrap();
        assert_eq!(loaded.current_sentence_index, Some(3));
        assert_eq!(loaded.progress, 32);
    }

    #[tokio::test]
    async fn reset_for_retry_keeps_checkpoint() {
        let catalog = Catalog::in_memory("secret");
        let t = task();
        catalog.insert_video_task(&t).await.unwrap();

        catalog.video_task_checkpoint(&t.id, 5, 40).await.unwrap();
        catalog
            .fail_video_task(&t.id, "ffmpeg failed", Some(SentenceId::new()))
            .await
            .unwrap();

        let failed = catalog.get_video_task(&t.id).await.unwrap();
        assert!(failed.can_resume());

        let reset = catalog.reset_video_task_for_retry(&t.id).await.unwrap();
        assert_eq!(reset.status, VideoTaskStatus::Pending);
        assert_eq!(reset.current_sentence_index, Some(5));
        assert!(reset.error_sentence_id.is_none());
    }

    #[tokio::test]
    async fn retry_requires_failed_state() {
        let catalog = Catalog::in_memory("secret");
        let t = task();
        catalog.insert_video_task(&t).await.unwrap();
        let err = catalog.reset_video_task_for_retry(&t.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn in_flight_tasks_cannot_be_deleted() {
        let catalog = Catalog::in_memory("secret");
        let t = task();
        catalog.insert_video_task(&t).await.unwrap();
        catalog
            .set_video_task_status(&t.id, VideoTaskStatus::Concatenating)
            .await
            .unwrap();

        let err = catalog.delete_video_task(&t.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::BusinessRule(_)));

        catalog
            .fail_video_task(&t.id, "stopped", None)
            .await
            .unwrap();
        catalog.delete_video_task(&t.id).await.unwrap();
        assert!(catalog.get_video_task(&t.id).await.is_err());
    }

    #[tokio::test]
    async fn completion_invariants_hold() {
        let catalog = Catalog::in_memory("secret");
        let t = task();
        catalog.insert_video_task(&t).await.unwrap();

        let done = catalog
            .complete_video_task(&t.id, "videos/u/20260801/v.mp4", 93)
            .await
            .unwrap();
        assert_eq!(done.status, VideoTaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.video_key.is_some());
        assert!(done.video_duration.is_some());
        assert!(done.error_message.is_none());
    }
}
