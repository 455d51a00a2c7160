//! Worker error types.

use std::time::Duration;
use thiserror::Error;

use mediadl_models::{JobId, JobStatus, ModelError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Output file missing: {0}")]
    OutputMissing(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Media error: {0}")]
    Media(#[from] mediadl_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] mediadl_queue::QueueError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn source_not_found(msg: impl Into<String>) -> Self {
        Self::SourceNotFound(msg.into())
    }

    pub fn output_missing(msg: impl Into<String>) -> Self {
        Self::OutputMissing(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Terminal status a job ends in when its handling fails with this error.
    pub fn terminal_status(&self) -> JobStatus {
        match self {
            WorkerError::Timeout(_) => JobStatus::Timeout,
            WorkerError::Cancelled(_) => JobStatus::Canceled,
            WorkerError::Media(e) if e.is_cancelled() => JobStatus::Canceled,
            _ => JobStatus::Failed,
        }
    }

    /// Whether the submission was refused because the queue is full.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_queue_full())
    }

    /// Whether the error was raised synchronously for bad input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkerError::Validation(_)
                | WorkerError::SourceNotFound(_)
                | WorkerError::Model(ModelError::InvalidSource(_))
                | WorkerError::Model(ModelError::InvalidOptions(_))
        )
    }

    /// Short machine-readable kind, used in driver responses.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Queue(e) if e.is_queue_full() => "queue_full",
            WorkerError::JobNotFound(_) | WorkerError::Queue(mediadl_queue::QueueError::JobNotFound(_)) => {
                "not_found"
            }
            e if e.is_validation() => "validation",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::Cancelled(_) => "cancelled",
            WorkerError::Media(mediadl_media::MediaError::DownloadFailed { .. }) => "download_failed",
            _ => "internal",
        }
    }
}
