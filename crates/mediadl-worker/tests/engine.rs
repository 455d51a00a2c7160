//! Engine tests against fake capabilities.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use mediadl_media::{
    CancelSignal, FetchOutcome, FetchRequest, Fetcher, MediaError, MediaResult, ProgressFn,
    TransformOutcome, TransformRequest, Transformer,
};
use mediadl_models::{
    FormatKind, Job, JobFamily, JobId, JobOptions, JobSource, JobStatus, MediaFormat, MediaInfo,
    ProgressSignal,
};
use mediadl_worker::driver::handle_line;
use mediadl_worker::{Engine, EngineConfig, FamilyConfig, WorkerError};

/// Tracks concurrent invocations, including ones dropped mid-flight.
#[derive(Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

struct Running<'a>(&'a Gauge);

impl Gauge {
    fn enter(&self) -> Running<'_> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Running(self)
    }

    fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Behavior is picked from the URL path: `/hang`, `/panic`, `/fail`,
/// `/slow`, `/silent`; anything else succeeds quickly.
#[derive(Default)]
struct FakeFetcher {
    gauge: Gauge,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn info(&self, url: &str) -> MediaResult<MediaInfo> {
        if url.ends_with("/hang") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        } else if url.ends_with("/fail") {
            return Err(MediaError::download_failed("ERROR: Unsupported URL"));
        }

        Ok(MediaInfo {
            id: "clip-1".to_string(),
            title: "clip".to_string(),
            duration: Some(12.5),
            thumbnail: Some("https://img.example.com/clip.jpg".to_string()),
            description: None,
            uploader: None,
            upload_date: None,
            view_count: None,
            formats: vec![MediaFormat {
                format_id: "18".to_string(),
                format_note: Some("360p".to_string()),
                ext: "mp4".to_string(),
                resolution: Some("640x360".to_string()),
                fps: None,
                filesize: None,
                kind: FormatKind::VideoAudio,
            }],
        })
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressFn,
        _cancel: CancelSignal,
    ) -> MediaResult<FetchOutcome> {
        let _running = self.gauge.enter();
        let path = request.output_dir.join(format!("{}_clip.mp4", request.job_id));

        if request.url.ends_with("/hang") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        } else if request.url.ends_with("/panic") {
            panic!("capability exploded");
        } else if request.url.ends_with("/fail") {
            return Err(MediaError::download_failed("HTTP Error 404: Not Found"));
        } else if request.url.ends_with("/slow") {
            progress(ProgressSignal::ratio(100, 100));
            tokio::time::sleep(Duration::from_millis(400)).await;
        } else {
            progress(ProgressSignal::ratio(50, 100));
            tokio::time::sleep(Duration::from_millis(150)).await;
        }

        tokio::fs::write(&path, b"fake media").await?;

        if request.url.ends_with("/silent") {
            // Leaves the file for the directory scan to find
            return Ok(FetchOutcome::default());
        }

        progress(ProgressSignal::finished(Some(path.clone())));
        Ok(FetchOutcome {
            path: Some(path),
            title: Some("clip".to_string()),
            thumbnail: Some("https://img.example.com/clip.jpg".to_string()),
        })
    }
}

/// Copies the source to the requested output.
struct CopyTransformer;

#[async_trait]
impl Transformer for CopyTransformer {
    async fn transform(
        &self,
        request: TransformRequest,
        progress: ProgressFn,
        _cancel: CancelSignal,
    ) -> MediaResult<TransformOutcome> {
        progress(ProgressSignal::ratio(1, 2));
        tokio::fs::copy(&request.source, &request.output).await?;
        Ok(TransformOutcome {
            output: request.output,
        })
    }
}

fn family(workers: usize, permits: usize, timeout: Duration) -> FamilyConfig {
    FamilyConfig {
        workers,
        permits,
        timeout,
    }
}

fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        storage_dir: dir.to_path_buf(),
        queue_capacity: 10,
        retrieval: family(1, 1, Duration::from_secs(5)),
        transform: family(1, 1, Duration::from_secs(5)),
        shutdown_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    }
}

fn engine_with(config: EngineConfig) -> (Engine, Arc<FakeFetcher>) {
    let fetcher = Arc::new(FakeFetcher::default());
    let engine = Engine::new(
        config,
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::new(CopyTransformer),
    );
    (engine, fetcher)
}

fn submit_url(engine: &Engine, path: &str) -> Result<JobId, WorkerError> {
    engine.submit(
        JobFamily::Retrieval,
        JobSource::Url(format!("https://media.example.com{}", path)),
        JobOptions::default(),
    )
}

async fn wait_for(engine: &Engine, id: &JobId, pred: impl Fn(&Job) -> bool) -> Job {
    let poll = async {
        loop {
            if let Ok(job) = engine.query(id) {
                if pred(&job) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(8), poll)
        .await
        .expect("job did not reach the expected state")
}

async fn wait_terminal(engine: &Engine, id: &JobId) -> Job {
    wait_for(engine, id, |j| j.is_terminal()).await
}

#[tokio::test]
async fn test_overflow_is_rejected_without_workers() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        queue_capacity: 2,
        ..test_config(dir.path())
    };
    let (engine, _) = engine_with(config);

    let a = submit_url(&engine, "/a").unwrap();
    let b = submit_url(&engine, "/b").unwrap();
    assert_ne!(a, b);

    let err = submit_url(&engine, "/c").unwrap_err();
    assert!(err.is_queue_full());
    assert_eq!(err.kind(), "queue_full");

    assert_eq!(engine.list().len(), 2);
    let stats = engine.stats();
    assert_eq!(stats.queued_jobs, 2);
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.queue_utilization_percent, 50.0);
    assert!(!stats.version.is_empty());
}

#[tokio::test]
async fn test_invalid_submissions_leave_no_record() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));

    let err = engine
        .submit(
            JobFamily::Retrieval,
            JobSource::Url("ftp://media.example.com/a".into()),
            JobOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = engine
        .submit(
            JobFamily::Retrieval,
            JobSource::Url("https://media.example.com/a".into()),
            JobOptions {
                quality: Some(0),
                ..JobOptions::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = engine
        .submit(
            JobFamily::Transform,
            JobSource::job(JobId::new()),
            JobOptions::transform("mp3"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    assert!(engine.list().is_empty());
}

#[tokio::test]
async fn test_retrieval_completes() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/video").unwrap();
    let job = wait_terminal(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.title.as_deref(), Some("clip"));
    assert_eq!(job.thumbnail.as_deref(), Some("https://img.example.com/clip.jpg"));
    assert_eq!(job.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(job.file_size, Some(10));
    assert!(job.error.is_none());
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.output_path.as_ref().unwrap().exists());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unreported_file_is_found_by_scan() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/silent").unwrap();
    let job = wait_terminal(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let output = job.output_path.unwrap();
    assert!(output
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with(id.as_str()));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_tool_failure_fails_job() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/fail").unwrap();
    let job = wait_terminal(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("404"));
    assert!(job.output_path.is_none());
    assert!(job.progress < 100.0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_single_permit_serializes_jobs() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        retrieval: family(3, 1, Duration::from_secs(5)),
        ..test_config(dir.path())
    };
    let (engine, fetcher) = engine_with(config);
    engine.start().await.unwrap();

    let a = submit_url(&engine, "/a").unwrap();
    let b = submit_url(&engine, "/b").unwrap();

    let deadline = Instant::now() + Duration::from_secs(8);
    loop {
        let job_a = engine.query(&a).unwrap();
        let job_b = engine.query(&b).unwrap();
        if job_b.status == JobStatus::Active {
            assert!(job_a.is_terminal(), "B became active while A was {}", job_a.status);
        }
        if job_a.is_terminal() && job_b.is_terminal() {
            break;
        }
        assert!(Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(fetcher.gauge.peak(), 1);
    assert_eq!(engine.query(&a).unwrap().status, JobStatus::Completed);
    assert_eq!(engine.query(&b).unwrap().status, JobStatus::Completed);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_permits_bound_concurrency() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        retrieval: family(4, 2, Duration::from_secs(5)),
        ..test_config(dir.path())
    };
    let (engine, fetcher) = engine_with(config);
    engine.start().await.unwrap();

    let ids: Vec<JobId> = (0..6)
        .map(|i| submit_url(&engine, &format!("/clip{}", i)).unwrap())
        .collect();
    for id in &ids {
        assert_eq!(wait_terminal(&engine, id).await.status, JobStatus::Completed);
    }

    assert!(fetcher.gauge.peak() <= 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_deadline_times_out_and_releases_permit() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        retrieval: family(1, 1, Duration::from_secs(1)),
        ..test_config(dir.path())
    };
    let (engine, fetcher) = engine_with(config);
    engine.start().await.unwrap();

    let started = Instant::now();
    let slow = submit_url(&engine, "/hang").unwrap();
    let next = submit_url(&engine, "/after").unwrap();

    let job = wait_terminal(&engine, &slow).await;
    assert_eq!(job.status, JobStatus::Timeout);
    assert!(job.error.unwrap().contains("timed out"));
    assert!(job.progress < 100.0);
    assert!(started.elapsed() < Duration::from_secs(4));

    let job = wait_terminal(&engine, &next).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(fetcher.gauge.running(), 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_subsecond_deadline_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        retrieval: family(1, 1, Duration::from_millis(300)),
        ..test_config(dir.path())
    };
    let (engine, _) = engine_with(config);
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/hang").unwrap();
    let job = wait_terminal(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Timeout);
    assert!(job.error.unwrap().ends_with("timed out after 300ms"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_panic_fails_only_that_job() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let bad = submit_url(&engine, "/panic").unwrap();
    let good = submit_url(&engine, "/fine").unwrap();

    let job = wait_terminal(&engine, &bad).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("capability exploded"));

    let job = wait_terminal(&engine, &good).await;
    assert_eq!(job.status, JobStatus::Completed);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_progress_stays_below_100_until_completed() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/slow").unwrap();
    let job = wait_for(&engine, &id, |j| j.status == JobStatus::Active && j.progress > 0.0).await;
    assert_eq!(job.progress, 99.0);

    let job = wait_terminal(&engine, &id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_delete_known_and_unknown() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    assert!(!engine.delete(&JobId::new()).await);

    let id = submit_url(&engine, "/video").unwrap();
    let job = wait_terminal(&engine, &id).await;
    let output = job.output_path.unwrap();
    assert!(output.exists());

    assert!(engine.delete(&id).await);
    assert!(!output.exists());
    assert!(matches!(engine.query(&id), Err(WorkerError::JobNotFound(_))));
    assert!(!engine.delete(&id).await);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_delete_active_job_cancels_invocation() {
    let dir = TempDir::new().unwrap();
    let (engine, fetcher) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/hang").unwrap();
    wait_for(&engine, &id, |j| j.status == JobStatus::Active).await;

    assert!(engine.delete(&id).await);
    assert!(engine.query(&id).is_err());

    // Invocation is dropped and the permit comes back
    let next = submit_url(&engine, "/after").unwrap();
    let job = wait_terminal(&engine, &next).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(fetcher.gauge.running(), 0);
    assert!(engine.query(&id).is_err());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_transform_of_completed_job() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let source = submit_url(&engine, "/video").unwrap();
    wait_terminal(&engine, &source).await;

    let err = engine
        .submit(
            JobFamily::Transform,
            JobSource::job(source.clone()),
            JobOptions::transform("xyz"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let id = engine
        .submit(
            JobFamily::Transform,
            JobSource::job(source.clone()),
            JobOptions::transform("mp3"),
        )
        .unwrap();
    let job = wait_terminal(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.content_type.as_deref(), Some("audio/mpeg"));
    let output = job.output_path.unwrap();
    assert_eq!(
        output.file_name().unwrap().to_string_lossy(),
        format!("{}_{}_clip.mp3", id, source)
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn test_transform_requires_completed_source() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));

    // Never started, so the source stays queued
    let source = submit_url(&engine, "/video").unwrap();
    let err = engine
        .submit(
            JobFamily::Transform,
            JobSource::job(source),
            JobOptions::transform("mp3"),
        )
        .unwrap_err();

    assert_eq!(err.kind(), "validation");
    assert_eq!(engine.list().len(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_jobs() {
    let dir = TempDir::new().unwrap();
    let (engine, fetcher) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/hang").unwrap();
    wait_for(&engine, &id, |j| j.status == JobStatus::Active).await;

    let started = Instant::now();
    engine.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(3));

    let job = engine.query(&id).unwrap();
    assert_eq!(job.status, JobStatus::Canceled);
    assert!(job.error.unwrap().contains("shutdown"));
    assert_eq!(fetcher.gauge.running(), 0);
}

#[tokio::test]
async fn test_sweeper_removes_expired_records() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));
    engine.start().await.unwrap();

    let id = submit_url(&engine, "/video").unwrap();
    let job = wait_terminal(&engine, &id).await;
    let output = job.output_path.unwrap();

    let report = engine
        .sweeper()
        .sweep_once(Utc::now() + ChronoDuration::minutes(29))
        .await;
    assert_eq!(report.records_removed, 0);
    assert!(engine.query(&id).is_ok());

    let report = engine
        .sweeper()
        .sweep_once(Utc::now() + ChronoDuration::minutes(31))
        .await;
    assert_eq!(report.records_removed, 1);
    assert!(engine.query(&id).is_err());
    assert!(!output.exists());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_info_creates_no_job() {
    let dir = TempDir::new().unwrap();
    let (engine, fetcher) = engine_with(test_config(dir.path()));

    let info = engine.info("https://media.example.com/video").await.unwrap();
    assert_eq!(info.title, "clip");
    assert_eq!(info.formats[0].kind, FormatKind::VideoAudio);

    assert!(engine.list().is_empty());
    assert_eq!(fetcher.gauge.peak(), 0);
}

#[tokio::test]
async fn test_info_errors() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        retrieval: family(1, 1, Duration::from_millis(200)),
        ..test_config(dir.path())
    };
    let (engine, _) = engine_with(config);

    let err = engine.info("ftp://media.example.com/a").await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = engine.info("https://media.example.com/fail").await.unwrap_err();
    assert_eq!(err.kind(), "download_failed");

    let err = engine.info("https://media.example.com/hang").await.unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert!(err.to_string().ends_with("200ms"));
}

#[tokio::test]
async fn test_driver_info_command() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine_with(test_config(dir.path()));

    let response = handle_line(&engine, r#"{"cmd":"info","url":"https://media.example.com/v"}"#).await;
    assert!(response.ok);
    let data = response.data.unwrap();
    assert_eq!(data["title"], "clip");
    assert_eq!(data["thumbnail"], "https://img.example.com/clip.jpg");
    assert_eq!(data["formats"][0]["kind"], "video-audio");

    let response = handle_line(&engine, r#"{"cmd":"info","url":"not a url"}"#).await;
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().kind, "validation");
}
