//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("catalog error: {0}")]
    Catalog(#[from] narravo_catalog::CatalogError),

    #[error("storage error: {0}")]
    Storage(#[from] narravo_storage::StorageError),

    #[error("media error: {0}")]
    Media(#[from] narravo_media::MediaError),

    #[error("subtitle error: {0}")]
    Subtitle(#[from] narravo_subtitle::SubtitleError),

    #[error("provider error: {0}")]
    Provider(#[from] narravo_provider::ProviderError),

    #[error("queue error: {0}")]
    Queue(#[from] narravo_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Whether the scheduler should retry the attempt.
    ///
    /// Transient network/storage trouble is worth another attempt;
    /// validation failures, business-rule rejections and external-tool
    /// failures (FFmpeg, providers after gateway retries) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Storage(e) => matches!(
                e,
                narravo_storage::StorageError::DownloadFailed(_)
                    | narravo_storage::StorageError::UploadFailed(_)
                    | narravo_storage::StorageError::ListFailed(_)
            ),
            WorkerError::Queue(_) => true,
            WorkerError::Catalog(narravo_catalog::CatalogError::Backend(_)) => true,
            WorkerError::Subtitle(narravo_subtitle::SubtitleError::Transport(_)) => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
            || matches!(
                self,
                WorkerError::Provider(narravo_provider::ProviderError::Cancelled)
            )
            || matches!(
                self,
                WorkerError::Media(narravo_media::MediaError::Cancelled)
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(WorkerError::Storage(narravo_storage::StorageError::DownloadFailed(
            "net".into()
        ))
        .is_retryable());
        assert!(!WorkerError::validation("bad input").is_retryable());
        assert!(!WorkerError::Media(narravo_media::MediaError::FfmpegNotFound).is_retryable());
        assert!(
            !WorkerError::Provider(narravo_provider::ProviderError::RateLimited).is_retryable()
        );
    }

    #[test]
    fn cancellation_detection_spans_sources() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(WorkerError::Media(narravo_media::MediaError::Cancelled).is_cancelled());
        assert!(
            WorkerError::Provider(narravo_provider::ProviderError::Cancelled).is_cancelled()
        );
        assert!(!WorkerError::validation("x").is_cancelled());
    }
}
