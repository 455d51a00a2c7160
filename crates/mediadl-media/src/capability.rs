//! Capability contracts consumed by the worker pools.
//!
//! A capability performs the actual retrieval or transformation. The engine
//! only supplies a progress callback and a cancel signal, and treats the
//! returned path as provisional until it has verified the file itself.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use mediadl_models::{JobId, JobOptions, MediaInfo, ProgressSignal};

use crate::error::MediaResult;

/// Progress callback handed to a capability.
pub type ProgressFn = Arc<dyn Fn(ProgressSignal) + Send + Sync>;

/// Cancel signal handed to a capability. Flips to `true` once.
pub type CancelSignal = watch::Receiver<bool>;

/// Input of a retrieval.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub job_id: JobId,
    /// Remote reference (validated http(s) URL)
    pub url: String,
    pub options: JobOptions,
    /// Directory the artifact must be written into
    pub output_dir: PathBuf,
}

/// Result of a retrieval.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Final path as reported by the tool, if it reported one
    pub path: Option<PathBuf>,
    /// Human title of the asset
    pub title: Option<String>,
    /// Thumbnail URL of the asset
    pub thumbnail: Option<String>,
}

/// Input of a transform.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub job_id: JobId,
    /// Existing local file to read
    pub source: PathBuf,
    /// Path the result must be written to
    pub output: PathBuf,
    /// Normalized target extension
    pub target_format: String,
    pub options: JobOptions,
}

/// Result of a transform.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub output: PathBuf,
}

/// Fetches a remote media asset into local storage.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Look up metadata of `url` without retrieving it.
    async fn info(&self, url: &str) -> MediaResult<MediaInfo>;

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressFn,
        cancel: CancelSignal,
    ) -> MediaResult<FetchOutcome>;
}

/// Transforms a local asset into another format.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        request: TransformRequest,
        progress: ProgressFn,
        cancel: CancelSignal,
    ) -> MediaResult<TransformOutcome>;
}
