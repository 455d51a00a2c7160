//! Job records and the job status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::options::JobOptions;
use crate::progress::{COMPLETE_PROGRESS, MAX_REPORTED_PROGRESS};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job category. Each family has its own queue, worker pool and permit bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    /// Fetch a remote media asset
    Retrieval,
    /// Transform a local asset into another format
    Transform,
}

impl JobFamily {
    pub const ALL: [JobFamily; 2] = [JobFamily::Retrieval, JobFamily::Transform];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobFamily::Retrieval => "retrieval",
            JobFamily::Transform => "transform",
        }
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
///
/// `Pending -> Queued -> Active -> {Completed, Failed, Timeout, Canceled}`.
/// No transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record created, not yet admitted to a queue
    #[default]
    Pending,
    /// Admitted to the family queue
    Queued,
    /// A worker holds the job and a permit
    Active,
    /// Output artifact produced and verified
    Completed,
    /// External tool or validation failure
    Failed,
    /// Deadline exceeded
    Timeout,
    /// Invocation cancelled (deletion or shutdown)
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Canceled
        )
    }

    /// Whether `next` is a legal edge from this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Queued) => true,
            (JobStatus::Queued, JobStatus::Active) => true,
            (JobStatus::Active, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input reference of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobSource {
    /// Remote media URL (retrieval input)
    Url(String),
    /// Prior completed job whose output is the input (transform input)
    Job(JobId),
}

impl JobSource {
    /// Parse and validate a remote URL reference. Only http(s) is accepted.
    pub fn url(raw: impl AsRef<str>) -> ModelResult<Self> {
        let raw = raw.as_ref().trim();
        let parsed = url::Url::parse(raw)
            .map_err(|e| ModelError::invalid_source(format!("{}: {}", raw, e)))?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self::Url(parsed.to_string())),
            other => Err(ModelError::invalid_source(format!(
                "unsupported URL scheme: {}",
                other
            ))),
        }
    }

    /// Reference the output of a prior job.
    pub fn job(id: impl Into<JobId>) -> Self {
        Self::Job(id.into())
    }
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSource::Url(url) => write!(f, "{}", url),
            JobSource::Job(id) => write!(f, "job:{}", id),
        }
    }
}

/// One unit of retrieval or transform work tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job family
    pub family: JobFamily,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0.0-100.0)
    #[serde(default)]
    pub progress: f64,

    /// Input reference
    pub source: JobSource,

    /// Pass-through options for the external capability
    #[serde(default)]
    pub options: JobOptions,

    /// Output artifact (set only when completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Provisional filename reported while the job is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_path: Option<PathBuf>,

    /// Title reported by the retrieval tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Thumbnail URL reported by the retrieval tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// Failure reason (failed, timeout, canceled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// MIME type of the output artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Size of the output artifact in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set exactly once, at the first terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(family: JobFamily, source: JobSource, options: JobOptions) -> Self {
        Self {
            id: JobId::new(),
            family,
            status: JobStatus::Pending,
            progress: 0.0,
            source,
            options,
            output_path: None,
            partial_path: None,
            title: None,
            thumbnail: None,
            error: None,
            content_type: None,
            file_size: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a new pending retrieval job.
    pub fn new_retrieval(source: JobSource, options: JobOptions) -> Self {
        Self::new(JobFamily::Retrieval, source, options)
    }

    /// Create a new pending transform job.
    pub fn new_transform(source: JobSource, options: JobOptions) -> Self {
        Self::new(JobFamily::Transform, source, options)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, rejecting edges outside the state machine.
    pub fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the job as admitted to its queue.
    pub fn enqueue(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Queued)
    }

    /// Mark the job as picked up by a worker holding a permit.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Active)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as completed with a verified output artifact.
    pub fn complete(
        &mut self,
        output_path: PathBuf,
        content_type: impl Into<String>,
        file_size: u64,
    ) -> ModelResult<()> {
        self.finish(JobStatus::Completed, None)?;
        self.progress = COMPLETE_PROGRESS;
        self.output_path = Some(output_path);
        self.partial_path = None;
        self.content_type = Some(content_type.into());
        self.file_size = Some(file_size);
        Ok(())
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.finish(JobStatus::Failed, Some(error.into()))
    }

    /// Mark the job as timed out.
    pub fn time_out(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.finish(JobStatus::Timeout, Some(error.into()))
    }

    /// Mark the job as canceled.
    pub fn cancel(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.finish(JobStatus::Canceled, Some(error.into()))
    }

    fn finish(&mut self, status: JobStatus, error: Option<String>) -> ModelResult<()> {
        self.transition(status)?;
        self.error = error;
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Apply a reported progress value.
    ///
    /// Only active jobs accept progress. Values never decrease and stay below
    /// 100 until the worker completes the job. Returns whether the stored
    /// value changed.
    pub fn apply_progress(&mut self, value: f64) -> bool {
        if self.status != JobStatus::Active || !value.is_finite() {
            return false;
        }

        let value = value.clamp(0.0, COMPLETE_PROGRESS);
        let value = if value >= COMPLETE_PROGRESS {
            MAX_REPORTED_PROGRESS.max(self.progress)
        } else {
            value
        };

        if value > self.progress {
            self.progress = value;
            true
        } else {
            false
        }
    }

    /// File currently owned by this record, if any.
    pub fn backing_file(&self) -> Option<&PathBuf> {
        self.output_path.as_ref().or(self.partial_path.as_ref())
    }
}
