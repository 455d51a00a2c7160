//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for the job lifecycle with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use mediadl_models::{JobFamily, JobId};

/// Job logger carrying the job id, family and worker index.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    family: JobFamily,
    worker: usize,
}

impl JobLogger {
    pub fn new(job_id: &JobId, family: JobFamily, worker: usize) -> Self {
        Self {
            job_id: job_id.clone(),
            family,
            worker,
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            family = %self.family,
            worker = self.worker,
            "Job started: {}", message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            family = %self.family,
            worker = self.worker,
            "Job warning: {}", message
        );
    }

    /// Log a failure, timeout or cancellation.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            family = %self.family,
            worker = self.worker,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            family = %self.family,
            worker = self.worker,
            "Job completed: {}", message
        );
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            family = %self.family,
            worker = self.worker
        )
    }
}

