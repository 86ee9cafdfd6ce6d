//! Task types carried by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use narravo_models::{ApiKeyId, ChapterId, ProjectId, SentenceId, TaskId, UserId, VideoTaskId};

/// Default soft deadline before cancellation is requested (seconds).
pub const DEFAULT_SOFT_DEADLINE_SECS: u64 = 480;
/// Default hard deadline before the attempt is force-failed (seconds).
pub const DEFAULT_HARD_DEADLINE_SECS: u64 = 600;
/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What a task does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Parse an uploaded document into chapters/paragraphs/sentences.
    ParseDocument {
        project_id: ProjectId,
        owner_id: UserId,
    },
    /// Reset a failed project and parse it again.
    RetryFailedProject {
        project_id: ProjectId,
        owner_id: UserId,
    },
    /// Generate image prompts for every sentence of a chapter.
    GeneratePrompts {
        chapter_id: ChapterId,
        api_key_id: ApiKeyId,
        style: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Generate image prompts for an explicit sentence subset.
    GeneratePromptsByIds {
        sentence_ids: Vec<SentenceId>,
        api_key_id: ApiKeyId,
        style: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Generate images for sentences that already carry prompts.
    GenerateImages {
        sentence_ids: Vec<SentenceId>,
        api_key_id: ApiKeyId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Synthesize voice-overs for sentences.
    GenerateAudio {
        sentence_ids: Vec<SentenceId>,
        api_key_id: ApiKeyId,
        voice: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Drive one chapter video task end to end.
    SynthesizeVideo { video_task_id: VideoTaskId },
}

impl TaskPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::ParseDocument { .. } => "parse_document",
            TaskPayload::RetryFailedProject { .. } => "retry_failed_project",
            TaskPayload::GeneratePrompts { .. } => "generate_prompts",
            TaskPayload::GeneratePromptsByIds { .. } => "generate_prompts_by_ids",
            TaskPayload::GenerateImages { .. } => "generate_images",
            TaskPayload::GenerateAudio { .. } => "generate_audio",
            TaskPayload::SynthesizeVideo { .. } => "synthesize_video",
        }
    }

    /// Deduplication key: two logically identical tasks collapse into one
    /// while the first is in flight.
    pub fn idempotency_key(&self) -> String {
        match self {
            TaskPayload::ParseDocument { project_id, .. } => {
                format!("parse:{project_id}")
            }
            TaskPayload::RetryFailedProject { project_id, .. } => {
                format!("retry_parse:{project_id}")
            }
            TaskPayload::GeneratePrompts { chapter_id, .. } => {
                format!("prompts:{chapter_id}")
            }
            TaskPayload::GeneratePromptsByIds { sentence_ids, .. } => {
                let mut ids: Vec<&str> = sentence_ids.iter().map(|s| s.as_str()).collect();
                ids.sort();
                format!("prompts_ids:{}", ids.join(","))
            }
            TaskPayload::GenerateImages { sentence_ids, .. } => {
                let mut ids: Vec<&str> = sentence_ids.iter().map(|s| s.as_str()).collect();
                ids.sort();
                format!("images:{}", ids.join(","))
            }
            TaskPayload::GenerateAudio { sentence_ids, .. } => {
                let mut ids: Vec<&str> = sentence_ids.iter().map(|s| s.as_str()).collect();
                ids.sort();
                format!("audio:{}", ids.join(","))
            }
            TaskPayload::SynthesizeVideo { video_task_id } => {
                format!("video:{video_task_id}")
            }
        }
    }
}

/// One scheduled unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub payload: TaskPayload,
    /// 1-based attempt counter; bumped on each re-queue.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Seconds until cooperative cancellation is requested.
    pub soft_deadline_secs: u64,
    /// Seconds until the attempt is force-failed.
    pub hard_deadline_secs: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: TaskId::new(),
            payload,
            attempt: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            soft_deadline_secs: DEFAULT_SOFT_DEADLINE_SECS,
            hard_deadline_secs: DEFAULT_HARD_DEADLINE_SECS,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_deadlines(mut self, soft_secs: u64, hard_secs: u64) -> Self {
        self.soft_deadline_secs = soft_secs;
        self.hard_deadline_secs = hard_secs.max(soft_secs);
        self
    }

    /// Prepare the next attempt of this task.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next.enqueued_at = Utc::now();
        next
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serde_roundtrip() {
        let task = ScheduledTask::new(TaskPayload::SynthesizeVideo {
            video_task_id: VideoTaskId::from_string("vt-1"),
        });
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"type\":\"synthesize_video\""));
        let back: ScheduledTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.payload.kind(), "synthesize_video");
    }

    #[test]
    fn idempotency_key_is_order_insensitive() {
        let a = TaskPayload::GenerateImages {
            sentence_ids: vec![SentenceId::from_string("s2"), SentenceId::from_string("s1")],
            api_key_id: ApiKeyId::from_string("k"),
            model: None,
        };
        let b = TaskPayload::GenerateImages {
            sentence_ids: vec![SentenceId::from_string("s1"), SentenceId::from_string("s2")],
            api_key_id: ApiKeyId::from_string("k"),
            model: None,
        };
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn attempts_count_up() {
        let task = ScheduledTask::new(TaskPayload::ParseDocument {
            project_id: ProjectId::from_string("p"),
            owner_id: UserId::from_string("u"),
        });
        assert!(task.attempts_remaining());
        let third = task.next_attempt().next_attempt();
        assert_eq!(third.attempt, 3);
        assert!(!third.attempts_remaining());
    }
}
