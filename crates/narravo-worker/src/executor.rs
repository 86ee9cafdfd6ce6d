//! Task executor: consumes scheduler tasks and dispatches them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use narravo_queue::{ScheduledTask, TaskPayload, TaskQueue};

use crate::error::{WorkerError, WorkerResult};
use crate::parse_task;
use crate::stages;
use crate::video_task_runner::VideoTaskRunner;
use crate::WorkerContext;

/// Consumes tasks from the queue and runs them under a concurrency bound.
pub struct TaskExecutor {
    ctx: Arc<WorkerContext>,
    queue: Arc<TaskQueue>,
    task_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl TaskExecutor {
    pub fn new(ctx: Arc<WorkerContext>, queue: TaskQueue) -> Self {
        let task_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_tasks));
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            queue: Arc::new(queue),
            task_semaphore,
            shutdown,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the consume loop until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent = self.ctx.config.max_concurrent_tasks,
            "task executor starting"
        );
        self.queue.init().await?;

        // Housekeeping: promote due retries, claim orphaned deliveries.
        let housekeeping = {
            let queue = Arc::clone(&self.queue);
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&self.task_semaphore);
            let consumer = self.consumer_name.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(ctx.config.housekeeping_interval);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            if let Err(e) = queue.promote_due_tasks().await {
                                warn!("failed to promote scheduled tasks: {e}");
                            }
                            let idle_ms = ctx.config.claim_min_idle.as_millis() as u64;
                            match queue.claim_pending(&consumer, idle_ms, 5).await {
                                Ok(claimed) => {
                                    for (message_id, task) in claimed {
                                        let Ok(permit) =
                                            Arc::clone(&semaphore).acquire_owned().await
                                        else {
                                            break;
                                        };
                                        let ctx = Arc::clone(&ctx);
                                        let queue = Arc::clone(&queue);
                                        tokio::spawn(async move {
                                            let _permit = permit;
                                            Self::execute(ctx, queue, message_id, task).await;
                                        });
                                    }
                                }
                                Err(e) => warn!("failed to claim pending tasks: {e}"),
                            }
                        }
                    }
                }
            })
        };

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown signal received");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!("consume error, backing off: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        housekeeping.abort();
        info!("waiting for in-flight tasks");
        let _ = tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_tasks()).await;
        info!("task executor stopped");
        Ok(())
    }

    async fn consume_batch(&self) -> WorkerResult<()> {
        let available = self.task_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let tasks = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        for (message_id, task) in tasks {
            let permit = Arc::clone(&self.task_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::task_failed("executor semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move {
                let _permit = permit;
                Self::execute(ctx, queue, message_id, task).await;
            });
        }

        Ok(())
    }

    async fn wait_for_tasks(&self) {
        loop {
            if self.task_semaphore.available_permits() == self.ctx.config.max_concurrent_tasks {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Run one delivered task with deadlines, then ack / retry / DLQ.
    async fn execute(
        ctx: Arc<WorkerContext>,
        queue: Arc<TaskQueue>,
        message_id: String,
        task: ScheduledTask,
    ) {
        info!(
            task_id = %task.id,
            kind = task.payload.kind(),
            attempt = task.attempt,
            "executing task"
        );

        // Soft deadline flips the cancel signal; the hard deadline kills
        // the attempt outright.
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let soft = Duration::from_secs(task.soft_deadline_secs);
        let hard = Duration::from_secs(task.hard_deadline_secs);
        let soft_timer = tokio::spawn(async move {
            tokio::time::sleep(soft).await;
            let _ = cancel_tx.send(true);
        });

        let outcome =
            tokio::time::timeout(hard, Self::process(&ctx, &task, cancel_rx.clone())).await;
        soft_timer.abort();

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(WorkerError::task_failed(format!(
                "hard deadline of {}s exceeded",
                task.hard_deadline_secs
            ))),
        };

        match result {
            Ok(()) => {
                info!(task_id = %task.id, "task completed");
                if let Err(e) = queue.ack(&message_id).await {
                    error!(task_id = %task.id, "failed to ack: {e}");
                }
                queue.clear_dedup(&task).await.ok();
                ctx.progress
                    .update(&task.id, None, Some("succeeded"), None)
                    .await
                    .ok();
            }
            Err(e) => {
                error!(task_id = %task.id, "task failed: {e}");
                let retry = Self::should_retry(&ctx, &task, &e).await;

                // Either path consumes this delivery.
                queue.clear_dedup(&task).await.ok();
                if retry {
                    info!(
                        task_id = %task.id,
                        attempt = task.attempt,
                        max = task.max_attempts,
                        "scheduling retry"
                    );
                    if let Err(requeue_err) = queue.requeue_with_backoff(&task).await {
                        error!(task_id = %task.id, "failed to requeue: {requeue_err}");
                        queue.dlq(&message_id, &task, &e.to_string()).await.ok();
                        return;
                    }
                    queue.ack(&message_id).await.ok();
                    ctx.progress
                        .update(&task.id, None, Some("retried"), Some(e.to_string()))
                        .await
                        .ok();
                } else {
                    queue.dlq(&message_id, &task, &e.to_string()).await.ok();
                    ctx.progress
                        .update(&task.id, None, Some("failed"), Some(e.to_string()))
                        .await
                        .ok();
                }
            }
        }
    }

    /// Retry policy per task kind.
    ///
    /// `synthesize_video` is only retried when the task row left a resume
    /// checkpoint - a blind retry would re-burn every provider call.
    async fn should_retry(ctx: &WorkerContext, task: &ScheduledTask, error: &WorkerError) -> bool {
        if !task.attempts_remaining() {
            return false;
        }
        if error.is_cancelled() {
            return false;
        }
        match &task.payload {
            TaskPayload::SynthesizeVideo { video_task_id } => {
                match ctx.catalog.get_video_task(video_task_id).await {
                    Ok(row) if row.can_resume() => {
                        // Reset here so the re-delivered attempt starts
                        // from pending with the checkpoint intact.
                        ctx.catalog
                            .reset_video_task_for_retry(video_task_id)
                            .await
                            .is_ok()
                    }
                    _ => false,
                }
            }
            _ => error.is_retryable(),
        }
    }

    /// Dispatch one task payload.
    async fn process(
        ctx: &Arc<WorkerContext>,
        task: &ScheduledTask,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<()> {
        match &task.payload {
            TaskPayload::ParseDocument {
                project_id,
                owner_id,
            } => parse_task::run_parse_document(ctx, project_id, owner_id).await,
            TaskPayload::RetryFailedProject {
                project_id,
                owner_id,
            } => parse_task::run_retry_failed_project(ctx, project_id, owner_id).await,
            TaskPayload::GeneratePrompts {
                chapter_id,
                api_key_id,
                style,
                model,
            } => stages::run_prompt_stage_for_chapter(
                Arc::clone(ctx),
                chapter_id,
                api_key_id,
                style,
                model.clone(),
                cancel,
            )
            .await
            .map(log_stage_outcome),
            TaskPayload::GeneratePromptsByIds {
                sentence_ids,
                api_key_id,
                style,
                model,
            } => stages::run_prompt_stage_for_sentences(
                Arc::clone(ctx),
                sentence_ids,
                api_key_id,
                style,
                model.clone(),
                cancel,
            )
            .await
            .map(log_stage_outcome),
            TaskPayload::GenerateImages {
                sentence_ids,
                api_key_id,
                model,
            } => stages::run_image_stage(
                Arc::clone(ctx),
                sentence_ids,
                api_key_id,
                model.clone(),
                cancel,
            )
            .await
            .map(log_stage_outcome),
            TaskPayload::GenerateAudio {
                sentence_ids,
                api_key_id,
                voice,
                model,
            } => stages::run_audio_stage(
                Arc::clone(ctx),
                sentence_ids,
                api_key_id,
                voice,
                model.clone(),
                cancel,
            )
            .await
            .map(log_stage_outcome),
            TaskPayload::SynthesizeVideo { video_task_id } => {
                VideoTaskRunner::new(Arc::clone(ctx))
                    .run(video_task_id, &task.id, cancel)
                    .await
            }
        }
    }
}

fn log_stage_outcome(outcome: stages::StageOutcome) {
    debug!(
        total = outcome.total,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "stage finished"
    );
}
