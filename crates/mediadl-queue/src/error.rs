//! Queue error types.

use thiserror::Error;

use mediadl_models::{JobFamily, JobId, ModelError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is full: {family} queue at capacity {capacity}")]
    QueueFull { family: JobFamily, capacity: usize },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("{0} queue is closed")]
    Closed(JobFamily),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl QueueError {
    pub fn queue_full(family: JobFamily, capacity: usize) -> Self {
        Self::QueueFull { family, capacity }
    }

    pub fn not_found(id: &JobId) -> Self {
        Self::JobNotFound(id.clone())
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}
