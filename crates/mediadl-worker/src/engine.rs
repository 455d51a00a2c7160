//! Job engine.
//!
//! The [`Engine`] owns the store, the per-family queues and permit pools, the
//! progress reporter, artifact storage and the cleanup sweeper. Instances are
//! fully isolated, so tests construct their own.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mediadl_media::formats::{extension_of, kind_of};
use mediadl_media::{
    can_convert, ArtifactStorage, Fetcher, ToolTransformer, Transformer, TransformerConfig,
    YtDlpConfig, YtDlpFetcher,
};
use mediadl_models::{
    Job, JobFamily, JobId, JobOptions, JobSource, JobStatus, MediaInfo, SystemStats,
};
use mediadl_queue::{JobQueue, JobStore, PermitPool, ProgressReporter};

use crate::config::EngineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::executor;
use crate::metrics;
use crate::sweeper::CleanupSweeper;
use crate::timeout::TimeoutGuard;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Queue, permits and deadline of one family.
pub(crate) struct FamilyRuntime {
    pub(crate) queue: JobQueue,
    pub(crate) permits: PermitPool,
    pub(crate) guard: TimeoutGuard,
    pub(crate) workers: usize,
}

impl FamilyRuntime {
    fn new(family: JobFamily, config: &EngineConfig) -> Self {
        let limits = config.family(family);
        Self {
            queue: JobQueue::new(family, config.queue_capacity),
            permits: PermitPool::new(family, limits.permits),
            guard: TimeoutGuard::new(limits.timeout),
            workers: limits.workers,
        }
    }
}

/// State shared between the engine handle and its worker tasks.
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<JobStore>,
    pub(crate) reporter: ProgressReporter,
    pub(crate) storage: Arc<ArtifactStorage>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) transformer: Arc<dyn Transformer>,
    /// Abort senders of jobs currently held by a worker
    pub(crate) active: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    pub(crate) shutdown: watch::Sender<bool>,
    retrieval: FamilyRuntime,
    transform: FamilyRuntime,
    sweeper: Arc<CleanupSweeper>,
    started_at: Instant,
}

impl EngineInner {
    pub(crate) fn runtime(&self, family: JobFamily) -> &FamilyRuntime {
        match family {
            JobFamily::Retrieval => &self.retrieval,
            JobFamily::Transform => &self.transform,
        }
    }

    /// Resolve and check the input file of a transform at admission.
    ///
    /// The source must be a completed job whose file still exists, is within
    /// the conversion size limit and can be converted to `target`.
    pub(crate) fn admit_transform_source(
        &self,
        source: &JobSource,
        target: &str,
    ) -> WorkerResult<PathBuf> {
        let path = self.source_output(source)?;
        let size = std::fs::metadata(&path).map(|m| m.len());
        self.check_source_file(path, size, target)
    }

    /// Same checks as [`EngineInner::admit_transform_source`], for workers.
    pub(crate) async fn resolve_transform_source(
        &self,
        source: &JobSource,
        target: &str,
    ) -> WorkerResult<PathBuf> {
        let path = self.source_output(source)?;
        let size = tokio::fs::metadata(&path).await.map(|m| m.len());
        self.check_source_file(path, size, target)
    }

    fn source_output(&self, source: &JobSource) -> WorkerResult<PathBuf> {
        let JobSource::Job(source_id) = source else {
            return Err(WorkerError::validation(
                "transform source must reference a completed job",
            ));
        };

        let source_job = self
            .store
            .get(source_id)
            .map_err(|_| WorkerError::source_not_found(format!("source job {} not found", source_id)))?;

        if source_job.status != JobStatus::Completed {
            return Err(WorkerError::validation(format!(
                "source job {} is {}, not completed",
                source_id, source_job.status
            )));
        }

        source_job.output_path.ok_or_else(|| {
            WorkerError::source_not_found(format!("source job {} has no output", source_id))
        })
    }

    fn check_source_file(
        &self,
        path: PathBuf,
        size: std::io::Result<u64>,
        target: &str,
    ) -> WorkerResult<PathBuf> {
        let size = size.map_err(|_| {
            WorkerError::source_not_found(format!("source file missing: {}", path.display()))
        })?;

        let limit = self.config.max_conversion_bytes();
        if size > limit {
            return Err(WorkerError::validation(format!(
                "source file is {} MB, limit is {} MB",
                size / BYTES_PER_MB,
                limit / BYTES_PER_MB
            )));
        }

        let kind = kind_of(&path).ok_or_else(|| {
            WorkerError::validation(format!("unsupported source format: {}", path.display()))
        })?;
        let ext = extension_of(&path).unwrap_or_default();
        if !can_convert(kind, &ext, target) {
            return Err(WorkerError::validation(format!(
                "cannot convert {} to {}",
                ext, target
            )));
        }

        Ok(path)
    }
}

/// Media job engine.
pub struct Engine {
    inner: Arc<EngineInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create an engine around the given capabilities. Nothing runs until
    /// [`Engine::start`].
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        let store = Arc::new(JobStore::new());
        let storage = Arc::new(ArtifactStorage::new(&config.storage_dir));
        let sweeper = Arc::new(CleanupSweeper::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            config.cleanup_interval,
            config.artifact_retention,
            config.record_retention,
        ));
        let (shutdown, _) = watch::channel(false);

        let inner = EngineInner {
            reporter: ProgressReporter::new(Arc::clone(&store)),
            retrieval: FamilyRuntime::new(JobFamily::Retrieval, &config),
            transform: FamilyRuntime::new(JobFamily::Transform, &config),
            store,
            storage,
            fetcher,
            transformer,
            active: Mutex::new(HashMap::new()),
            shutdown,
            sweeper,
            started_at: Instant::now(),
            config,
        };

        Self {
            inner: Arc::new(inner),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Create an engine driving yt-dlp, FFmpeg and ImageMagick.
    pub fn with_tools(config: EngineConfig) -> Self {
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            binary: config.tools.ytdlp.clone(),
            ffmpeg: Some(config.tools.ffmpeg.clone()),
            max_filesize_mb: config.max_file_size_mb,
        });
        let transformer = ToolTransformer::new(TransformerConfig {
            ffmpeg: config.tools.ffmpeg.clone(),
            ffprobe: config.tools.ffprobe.clone(),
            imagemagick: config.tools.imagemagick.clone(),
            default_image_quality: config.default_image_quality,
        });
        Self::new(config, Arc::new(fetcher), Arc::new(transformer))
    }

    /// Create the artifact root and spawn the workers and the sweeper.
    pub async fn start(&self) -> WorkerResult<()> {
        self.inner.storage.ensure_root().await?;

        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("Engine already started");
            return Ok(());
        }

        for family in JobFamily::ALL {
            let runtime = self.inner.runtime(family);
            info!(
                family = %family,
                workers = runtime.workers,
                permits = runtime.permits.size(),
                timeout_secs = runtime.guard.deadline().as_secs(),
                "Starting worker pool"
            );
            for worker in 0..runtime.workers {
                let inner = Arc::clone(&self.inner);
                handles.push(tokio::spawn(executor::run_worker(inner, family, worker)));
            }
        }

        let sweeper = Arc::clone(&self.inner.sweeper);
        let shutdown_rx = self.inner.shutdown.subscribe();
        handles.push(tokio::spawn(async move { sweeper.run(shutdown_rx).await }));

        info!(storage = %self.inner.storage.root().display(), "Engine started");
        Ok(())
    }

    /// Admit a job. Never blocks; a full queue fails with `QueueFull` and
    /// leaves no record behind.
    pub fn submit(
        &self,
        family: JobFamily,
        source: JobSource,
        options: JobOptions,
    ) -> WorkerResult<JobId> {
        let result = self.admit(family, source, options);

        match &result {
            Ok(id) => {
                let queued = self.inner.runtime(family).queue.len();
                metrics::record_job_submitted(family);
                metrics::record_queue_length(family, queued);
                info!(job_id = %id, family = %family, queued, "Job submitted");
            }
            Err(e) => {
                metrics::record_job_rejected(family, e.kind());
                warn!(family = %family, "Submission rejected: {}", e);
            }
        }

        result
    }

    fn admit(
        &self,
        family: JobFamily,
        source: JobSource,
        options: JobOptions,
    ) -> WorkerResult<JobId> {
        options.validate()?;

        let source = match (family, source) {
            (JobFamily::Retrieval, JobSource::Url(raw)) => JobSource::url(raw)?,
            (JobFamily::Transform, source @ JobSource::Job(_)) => {
                let target = options
                    .target_format()
                    .ok_or_else(|| WorkerError::validation("output format is required"))?;
                self.inner.admit_transform_source(&source, &target)?;
                source
            }
            (JobFamily::Retrieval, _) => {
                return Err(WorkerError::validation("retrieval source must be a URL"));
            }
            (JobFamily::Transform, _) => {
                return Err(WorkerError::validation(
                    "transform source must reference a completed job",
                ));
            }
        };

        let job = Job::new(family, source, options);
        let id = self.inner.runtime(family).queue.admit(&self.inner.store, job)?;
        Ok(id)
    }

    /// Look up metadata of a remote asset without creating a job.
    ///
    /// Runs on the caller's task, bounded by the retrieval deadline.
    pub async fn info(&self, url: &str) -> WorkerResult<MediaInfo> {
        let JobSource::Url(url) = JobSource::url(url)? else {
            return Err(WorkerError::validation("info source must be a URL"));
        };

        let deadline = self.inner.retrieval.guard.deadline();
        match tokio::time::timeout(deadline, self.inner.fetcher.info(&url)).await {
            Ok(Ok(info)) => {
                debug!(url = %url, title = %info.title, formats = info.formats.len(), "Media info found");
                Ok(info)
            }
            Ok(Err(e)) => {
                warn!(url = %url, "Media info lookup failed: {}", e);
                Err(e.into())
            }
            Err(_) => {
                warn!(url = %url, "Media info lookup timed out after {:?}", deadline);
                Err(WorkerError::Timeout(deadline))
            }
        }
    }

    /// Current record of a job.
    pub fn query(&self, id: &JobId) -> WorkerResult<Job> {
        self.inner
            .store
            .get(id)
            .map_err(|_| WorkerError::JobNotFound(id.clone()))
    }

    /// Snapshot of all tracked jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        self.inner.store.list()
    }

    /// Remove a job and its file. An active job is cancelled.
    ///
    /// Returns `false` for an unknown id.
    pub async fn delete(&self, id: &JobId) -> bool {
        let removed = self.inner.store.delete(id).await;

        if let Some(abort) = self.inner.active.lock().get(id) {
            abort.send_replace(true);
            info!(job_id = %id, "Cancelling active job on delete");
        }

        if removed {
            info!(job_id = %id, "Job deleted");
        }
        removed
    }

    /// Point-in-time engine statistics.
    pub fn stats(&self) -> SystemStats {
        let jobs = self.inner.store.list();
        let mut stats = SystemStats::tally(&jobs);

        let (queued, capacity) = JobFamily::ALL.iter().fold((0, 0), |(len, cap), family| {
            let queue = &self.inner.runtime(*family).queue;
            (len + queue.len(), cap + queue.capacity())
        });
        stats.queue_utilization_percent = if capacity == 0 {
            0.0
        } else {
            queued as f64 / capacity as f64 * 100.0
        };
        stats.disk_usage_percent = self.inner.storage.disk_usage_percent().unwrap_or(0.0);
        stats.uptime_seconds = self.inner.started_at.elapsed().as_secs_f64();
        stats.version = env!("CARGO_PKG_VERSION").to_string();
        stats
    }

    /// Stop the workers and the sweeper and wait for them to exit.
    ///
    /// In-flight jobs end `CANCELED`; queued jobs stay queued. The permit
    /// pools are closed, so nothing acquires a permit afterwards.
    pub async fn shutdown(&self) {
        info!("Shutting down engine");
        self.inner.shutdown.send_replace(true);
        for family in JobFamily::ALL {
            self.inner.runtime(family).permits.close();
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let timeout = self.inner.config.shutdown_timeout;

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("Shutdown did not finish within {:?}", timeout);
        }

        info!("Engine stopped");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.inner.storage
    }

    pub fn sweeper(&self) -> &CleanupSweeper {
        &self.inner.sweeper
    }
}
