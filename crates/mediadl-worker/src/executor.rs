//! Worker loop.
//!
//! Each worker drains its family queue: dequeue, acquire a permit, move the
//! record to `ACTIVE`, run the capability under the timeout guard and write
//! the terminal state. Everything that goes wrong while handling one job,
//! panics included, ends in a terminal record for that job only.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, Instrument};

use mediadl_media::{
    content_type_for, CancelSignal, FetchRequest, ProgressFn, TransformRequest,
};
use mediadl_models::{Job, JobFamily, JobId, JobSource, JobStatus};
use mediadl_queue::QueueError;

use crate::engine::{EngineInner, FamilyRuntime};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::timeout::{signalled, GuardOutcome, Interrupt};

/// Pause after an unexpected error in the loop itself.
const SCAFFOLD_BACKOFF: Duration = Duration::from_secs(1);

/// Run one worker until shutdown.
pub(crate) async fn run_worker(inner: Arc<EngineInner>, family: JobFamily, worker: usize) {
    let runtime = inner.runtime(family);
    let mut shutdown = inner.shutdown.subscribe();

    debug!(family = %family, worker, "Worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = signalled(&mut shutdown) => break,
            next = runtime.queue.dequeue() => next,
        };
        let Some(id) = next else {
            break;
        };
        metrics::record_queue_length(family, runtime.queue.len());

        if !inner.store.contains(&id) {
            debug!(job_id = %id, "Skipping deleted job");
            continue;
        }

        let permit = tokio::select! {
            biased;
            _ = signalled(&mut shutdown) => break,
            permit = runtime.permits.acquire() => permit,
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                error!(family = %family, worker, "Failed to acquire permit: {}", e);
                if backoff(&mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        let result = execute(&inner, runtime, family, worker, &id, &mut shutdown).await;
        // Released only after the terminal write
        drop(permit);

        if let Err(e) = result {
            error!(job_id = %id, family = %family, worker, "Worker error: {}", e);
            if backoff(&mut shutdown).await {
                break;
            }
        }
    }

    debug!(family = %family, worker, "Worker stopped");
}

/// Sleep for the back-off period. Returns `true` if shutdown fired first.
async fn backoff(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(SCAFFOLD_BACKOFF) => false,
        _ = signalled(shutdown) => true,
    }
}

/// Handle one dequeued job while holding a permit.
async fn execute(
    inner: &EngineInner,
    runtime: &FamilyRuntime,
    family: JobFamily,
    worker: usize,
    id: &JobId,
    shutdown: &mut watch::Receiver<bool>,
) -> WorkerResult<()> {
    // Registered before the record goes active so a delete always finds it
    let (abort_tx, mut deleted) = watch::channel(false);
    inner.active.lock().insert(id.clone(), abort_tx);

    let job = match inner.store.update(id, |job| job.start().map(|_| job.clone())) {
        Ok(Ok(job)) => job,
        Ok(Err(e)) => {
            inner.active.lock().remove(id);
            return Err(e.into());
        }
        Err(QueueError::JobNotFound(_)) => {
            inner.active.lock().remove(id);
            debug!(job_id = %id, "Job deleted before start");
            return Ok(());
        }
        Err(e) => {
            inner.active.lock().remove(id);
            return Err(e.into());
        }
    };

    let logger = JobLogger::new(id, family, worker);
    let span = logger.create_span();

    let status = async {
        logger.log_start(&job.source.to_string());
        let started = Instant::now();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let progress: ProgressFn = Arc::new(inner.reporter.callback(id.clone()));

        let invocation = AssertUnwindSafe(invoke(inner, &job, progress, cancel_rx)).catch_unwind();
        let outcome = runtime
            .guard
            .run(invocation, &cancel_tx, &mut deleted, shutdown)
            .await;

        let result = match outcome {
            GuardOutcome::Completed(Ok(result)) => result,
            GuardOutcome::Completed(Err(panic)) => {
                Err(WorkerError::Panicked(panic_message(panic.as_ref())))
            }
            GuardOutcome::TimedOut(deadline) => Err(WorkerError::Timeout(deadline)),
            GuardOutcome::Interrupted(Interrupt::Deleted) => {
                Err(WorkerError::cancelled("job deleted"))
            }
            GuardOutcome::Interrupted(Interrupt::Shutdown) => {
                Err(WorkerError::cancelled("cancelled during shutdown"))
            }
        };

        let status = finish(inner, &logger, id, result).await;
        metrics::record_job_finished(family, status, started.elapsed().as_secs_f64());
        status
    }
    .instrument(span)
    .await;

    inner.active.lock().remove(id);
    debug!(job_id = %id, status = %status, "Job released");
    Ok(())
}

/// Call the family's capability and resolve the produced file.
async fn invoke(
    inner: &EngineInner,
    job: &Job,
    progress: ProgressFn,
    cancel: CancelSignal,
) -> WorkerResult<PathBuf> {
    match job.family {
        JobFamily::Retrieval => retrieve(inner, job, progress, cancel).await,
        JobFamily::Transform => transform(inner, job, progress, cancel).await,
    }
}

async fn retrieve(
    inner: &EngineInner,
    job: &Job,
    progress: ProgressFn,
    cancel: CancelSignal,
) -> WorkerResult<PathBuf> {
    let JobSource::Url(url) = &job.source else {
        return Err(WorkerError::validation("retrieval source must be a URL"));
    };

    let request = FetchRequest {
        job_id: job.id.clone(),
        url: url.clone(),
        options: job.options.clone(),
        output_dir: inner.storage.root().to_path_buf(),
    };
    let outcome = inner.fetcher.fetch(request, progress, cancel).await?;

    if outcome.title.is_some() || outcome.thumbnail.is_some() {
        let (title, thumbnail) = (outcome.title, outcome.thumbnail);
        let _ = inner.store.update(&job.id, |j| {
            if let Some(title) = title {
                j.title.get_or_insert(title);
            }
            if thumbnail.is_some() {
                j.thumbnail = thumbnail;
            }
        });
    }

    if let Some(path) = outcome.path {
        if file_exists(&path).await {
            return Ok(path);
        }
        debug!(job_id = %job.id, path = %path.display(), "Reported file does not exist");
    }

    let partial = inner.store.get(&job.id).ok().and_then(|j| j.partial_path);
    if let Some(path) = partial {
        if file_exists(&path).await {
            return Ok(path);
        }
    }

    // The tool did not tell us where it wrote; look for our prefix
    let ext = job.options.stream_selection().output_extension();
    inner
        .storage
        .find_for_job(&job.id, Some(ext))
        .await?
        .ok_or_else(|| WorkerError::output_missing(format!("no file produced for job {}", job.id)))
}

async fn transform(
    inner: &EngineInner,
    job: &Job,
    progress: ProgressFn,
    cancel: CancelSignal,
) -> WorkerResult<PathBuf> {
    let target = job
        .options
        .target_format()
        .ok_or_else(|| WorkerError::validation("output format is required"))?;
    // The source may have been deleted since admission
    let source = inner.resolve_transform_source(&job.source, &target).await?;
    let output = inner.storage.transform_output_path(&job.id, &source, &target);

    let request = TransformRequest {
        job_id: job.id.clone(),
        source,
        output,
        target_format: target,
        options: job.options.clone(),
    };
    let outcome = inner.transformer.transform(request, progress, cancel).await?;

    if !file_exists(&outcome.output).await {
        return Err(WorkerError::output_missing(outcome.output.display().to_string()));
    }
    Ok(outcome.output)
}

/// Write the terminal state. Returns the status the job ended in.
async fn finish(
    inner: &EngineInner,
    logger: &JobLogger,
    id: &JobId,
    result: WorkerResult<PathBuf>,
) -> JobStatus {
    let resolved = match result {
        Ok(path) => match inner.storage.stat(&path).await {
            Ok(Some(size)) => Ok((path, size)),
            Ok(None) => Err(WorkerError::output_missing(path.display().to_string())),
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e),
    };

    let (status, written) = match &resolved {
        Ok((path, size)) => {
            let content_type = content_type_for(path);
            let written = inner
                .store
                .update(id, |job| job.complete(path.clone(), content_type, *size));
            (JobStatus::Completed, written)
        }
        Err(e) => {
            let status = e.terminal_status();
            let message = e.to_string();
            let written = inner.store.update(id, |job| match status {
                JobStatus::Timeout => job.time_out(message),
                JobStatus::Canceled => job.cancel(message),
                _ => job.fail(message),
            });
            (status, written)
        }
    };

    match written {
        Ok(Ok(())) => match &resolved {
            Ok((path, size)) => logger.log_completion(&format!(
                "{} ({} bytes)",
                path.display(),
                size
            )),
            Err(e) => logger.log_error(&format!("{}: {}", status, e)),
        },
        Ok(Err(e)) => logger.log_warning(&format!("Terminal write rejected: {}", e)),
        Err(_) => {
            // Record deleted mid-flight; drop whatever the tool left behind
            info!(job_id = %id, "Job deleted while active, removing its files");
            if let Ok(files) = inner.storage.files_for_job(id).await {
                for file in files {
                    inner.storage.delete_best_effort(&file).await;
                }
            }
        }
    }

    status
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
