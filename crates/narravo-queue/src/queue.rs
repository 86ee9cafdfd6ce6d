//! Task queue on Redis Streams.
//!
//! Consumers read through a consumer group and acknowledge only after the
//! task's result is written, so a crashed worker's messages are
//! re-claimed. Retries go through a delayed sorted set so the back-off
//! wait never blocks a worker.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use narravo_provider::RetryPolicy;

use crate::error::{QueueError, QueueResult};
use crate::task::ScheduledTask;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Back-off applied between attempts
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "narravo:tasks".to_string(),
            consumer_group: "narravo:workers".to_string(),
            dlq_stream_name: "narravo:dlq".to_string(),
            retry: RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(600), 3),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(stream) = std::env::var("QUEUE_STREAM") {
            config.stream_name = stream;
        }
        if let Ok(group) = std::env::var("QUEUE_CONSUMER_GROUP") {
            config.consumer_group = group;
        }
        if let Ok(dlq) = std::env::var("QUEUE_DLQ_STREAM") {
            config.dlq_stream_name = dlq;
        }
        config
    }
}

/// Task queue client.
pub struct TaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("created consumer group {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("consumer group {} already exists", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a task. Duplicate in-flight tasks (same idempotency key)
    /// are rejected.
    pub async fn enqueue(&self, task: &ScheduledTask) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(task)?;
        let idempotency_key = task.payload.idempotency_key();
        let dedup_key = format!("narravo:dedup:{idempotency_key}");

        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("duplicate task rejected: {idempotency_key}");
            return Err(QueueError::enqueue_failed("duplicate task"));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("task")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        // Dedup key expires on its own in case completion never runs.
        conn.set_ex::<_, _, ()>(&dedup_key, "1", 3600).await?;

        info!(
            task_id = %task.id,
            kind = task.payload.kind(),
            attempt = task.attempt,
            %message_id,
            "task enqueued"
        );
        Ok(message_id)
    }

    /// Re-queue a task's next attempt after its back-off delay.
    ///
    /// The task lands in a sorted set scored by its visibility time and is
    /// moved to the stream by `promote_due_tasks`.
    pub async fn requeue_with_backoff(&self, task: &ScheduledTask) -> QueueResult<()> {
        let next = task.next_attempt();
        let delay = self.config.retry.delay(task.attempt.saturating_sub(1));

        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&next)?;
        let visible_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;

        redis::cmd("ZADD")
            .arg("narravo:scheduled_tasks")
            .arg(visible_at)
            .arg(&payload)
            .query_async::<()>(&mut conn)
            .await?;

        info!(
            task_id = %next.id,
            attempt = next.attempt,
            delay_secs = delay.as_secs(),
            "task scheduled for retry"
        );
        Ok(())
    }

    /// Move due scheduled tasks onto the stream. Called periodically by
    /// the executor. Returns how many were promoted.
    pub async fn promote_due_tasks(&self) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let now = chrono::Utc::now().timestamp();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg("narravo:scheduled_tasks")
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        let mut moved = 0usize;
        for payload in &due {
            match serde_json::from_str::<ScheduledTask>(payload) {
                Ok(task) => match self.enqueue(&task).await {
                    Ok(_) => moved += 1,
                    Err(QueueError::EnqueueFailed(_)) => {
                        debug!("scheduled task was duplicate, dropping");
                    }
                    Err(e) => {
                        warn!("failed to promote scheduled task: {e}");
                        continue;
                    }
                },
                Err(e) => warn!("unparseable scheduled task dropped: {e}"),
            }

            redis::cmd("ZREM")
                .arg("narravo:scheduled_tasks")
                .arg(payload)
                .query_async::<()>(&mut conn)
                .await
                .ok();
        }

        if moved > 0 {
            info!(count = moved, "promoted scheduled tasks");
        }
        Ok(moved)
    }

    /// Consume tasks from the stream. Returns `(message_id, task)` pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, ScheduledTask)>> {
        let mut conn = self.conn().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();
                if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                    let payload = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<ScheduledTask>(&payload) {
                        Ok(task) => tasks.push((message_id, task)),
                        Err(e) => {
                            warn!("unparseable task payload, acking to drop: {e}");
                            self.ack(&message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(tasks)
    }

    /// Acknowledge and delete a delivered message.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("acknowledged message {message_id}");
        Ok(())
    }

    /// Release a task's dedup key after completion (success or DLQ), so
    /// the same logical task may be scheduled again later.
    pub async fn clear_dedup(&self, task: &ScheduledTask) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let dedup_key = format!("narravo:dedup:{}", task.payload.idempotency_key());
        conn.del::<_, ()>(&dedup_key).await?;
        Ok(())
    }

    /// Move a task to the dead letter queue.
    pub async fn dlq(
        &self,
        message_id: &str,
        task: &ScheduledTask,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(task)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("task")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;
        warn!(task_id = %task.id, "task moved to DLQ: {error}");
        Ok(())
    }

    /// Claim pending messages idle longer than `min_idle_ms` (crashed
    /// worker recovery).
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, ScheduledTask)>> {
        let mut conn = self.conn().await?;

        // XAUTOCLAIM scans and claims in one step.
        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::new();
        for entry in reply.claimed {
            let message_id = entry.id.clone();
            if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                let payload = String::from_utf8_lossy(payload);
                match serde_json::from_str::<ScheduledTask>(&payload) {
                    Ok(task) => {
                        info!(task_id = %task.id, "claimed pending task");
                        tasks.push((message_id, task));
                    }
                    Err(e) => {
                        warn!("unparseable claimed task, acking to drop: {e}");
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(tasks)
    }

    /// Queue depth.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// DLQ depth.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }
}
