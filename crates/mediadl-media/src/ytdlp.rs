//! Remote retrieval using yt-dlp.
//!
//! yt-dlp is asked to print machine-readable progress lines (see
//! [`crate::progress::parse_ytdlp_line`]) and the final file path after all
//! post-processing, so the driver never has to scrape human-oriented output.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use mediadl_models::{MediaInfo, ProgressSignal, StreamSelection};

use crate::capability::{CancelSignal, FetchOutcome, FetchRequest, Fetcher, ProgressFn};
use crate::command::ToolRunner;
use crate::error::{MediaError, MediaResult};
use crate::info::parse_info_json;
use crate::progress::{parse_ytdlp_line, YtDlpEvent, YTDLP_LINE_PREFIX};

/// Audio bitrate used when extracting mp3.
const AUDIO_QUALITY: &str = "192K";

/// yt-dlp driver configuration.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// yt-dlp binary name or path
    pub binary: PathBuf,
    /// FFmpeg location passed to yt-dlp for merging and extraction
    pub ffmpeg: Option<PathBuf>,
    /// Maximum download size in megabytes
    pub max_filesize_mb: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            ffmpeg: None,
            max_filesize_mb: 1000,
        }
    }
}

/// [`Fetcher`] backed by the yt-dlp CLI.
#[derive(Debug, Clone, Default)]
pub struct YtDlpFetcher {
    config: YtDlpConfig,
}

impl YtDlpFetcher {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Build the yt-dlp argument list for a request.
    pub fn build_args(&self, request: &FetchRequest) -> Vec<String> {
        let selection = request.options.stream_selection();
        let template = request
            .output_dir
            .join(format!("{}_%(title)s.%(ext)s", request.job_id));

        let mut args: Vec<String> = vec![
            "--newline".into(),
            // Any --print implies quiet, which would also hide the templates below
            "--progress".into(),
            "--no-colors".into(),
            "--no-playlist".into(),
            "--restrict-filenames".into(),
            "--no-simulate".into(),
            "--max-filesize".into(),
            format!("{}M", self.config.max_filesize_mb),
            "--progress-template".into(),
            format!(
                "download:{} download %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                YTDLP_LINE_PREFIX
            ),
            "--progress-template".into(),
            format!(
                "postprocess:{} postprocess %(progress.postprocessor)s %(progress.status)s",
                YTDLP_LINE_PREFIX
            ),
            "--print".into(),
            format!("before_dl:{} title %(title)s", YTDLP_LINE_PREFIX),
            "--print".into(),
            format!(
                "before_dl:{} size %(filesize,filesize_approx)s",
                YTDLP_LINE_PREFIX
            ),
            "--print".into(),
            format!("before_dl:{} thumbnail %(thumbnail)s", YTDLP_LINE_PREFIX),
            "--print".into(),
            format!("after_move:{} file %(filepath)s", YTDLP_LINE_PREFIX),
            "-o".into(),
            template.to_string_lossy().to_string(),
        ];

        if let Some(ffmpeg) = &self.config.ffmpeg {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.to_string_lossy().to_string());
        }

        let format = request
            .options
            .format_id
            .clone()
            .unwrap_or_else(|| default_format(selection).to_string());
        args.push("-f".into());
        args.push(format);

        match selection {
            StreamSelection::VideoAudio => {
                args.push("--merge-output-format".into());
                args.push("mp4".into());
            }
            StreamSelection::VideoOnly => {
                args.push("--recode-video".into());
                args.push("mp4".into());
            }
            StreamSelection::AudioOnly => {
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push("mp3".into());
                args.push("--audio-quality".into());
                args.push(AUDIO_QUALITY.into());
            }
        }

        args.push("--".into());
        args.push(request.url.clone());

        args
    }

    /// Build the yt-dlp argument list for a metadata lookup.
    pub fn build_info_args(&self, url: &str) -> Vec<String> {
        vec![
            "-J".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--no-colors".into(),
            "--".into(),
            url.to_string(),
        ]
    }
}

fn default_format(selection: StreamSelection) -> &'static str {
    match selection {
        StreamSelection::VideoAudio => "bestvideo+bestaudio/best",
        StreamSelection::VideoOnly => "bestvideo",
        StreamSelection::AudioOnly => "bestaudio",
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn info(&self, url: &str) -> MediaResult<MediaInfo> {
        debug!(url = %url, "Looking up media info");

        let mut json = String::new();
        let output = ToolRunner::new(&self.config.binary)
            .run(&self.build_info_args(url), |line| json.push_str(line))
            .await?;

        if !output.success() {
            let message = output.last_error_line().unwrap_or("Unknown error");
            warn!(url = %url, exit_code = ?output.status.code(), "yt-dlp info failed: {}", message);
            return Err(MediaError::download_failed(format!(
                "error fetching media info: {}",
                message
            )));
        }

        parse_info_json(&json)
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressFn,
        cancel: CancelSignal,
    ) -> MediaResult<FetchOutcome> {
        let args = self.build_args(&request);
        info!(
            job_id = %request.job_id,
            url = %request.url,
            selection = ?request.options.stream_selection(),
            "Starting yt-dlp retrieval"
        );

        let mut outcome = FetchOutcome::default();
        let mut too_large = false;
        let mut expected_size = None;

        let output = ToolRunner::new(&self.config.binary)
            .with_cancel(cancel)
            .run(&args, |line| match parse_ytdlp_line(line) {
                Some(YtDlpEvent::Progress(signal)) => {
                    match &signal {
                        ProgressSignal::Title { title } => outcome.title = Some(title.clone()),
                        ProgressSignal::Finished { path } => outcome.path = path.clone(),
                        _ => {}
                    }
                    progress(signal);
                }
                Some(YtDlpEvent::Size(bytes)) => expected_size = Some(bytes),
                Some(YtDlpEvent::Thumbnail(url)) => outcome.thumbnail = Some(url),
                Some(YtDlpEvent::TooLarge) => too_large = true,
                None => debug!(job_id = %request.job_id, "yt-dlp: {}", line),
            })
            .await?;

        if !output.success() {
            let message = output.last_error_line().unwrap_or("Unknown error");
            warn!(
                job_id = %request.job_id,
                exit_code = ?output.status.code(),
                "yt-dlp failed: {}",
                message
            );
            return Err(MediaError::download_failed(format!("yt-dlp failed: {}", message)));
        }

        // The skip notice is not printed in quiet mode; a skipped download
        // still shows up as an announced size over the limit and no file
        let limit = self.config.max_filesize_mb * 1024 * 1024;
        let over_limit = outcome.path.is_none() && expected_size.is_some_and(|size| size > limit);

        if too_large || over_limit {
            return Err(MediaError::resource_limit(format!(
                "file is larger than {} MB",
                self.config.max_filesize_mb
            )));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadl_models::{JobId, JobOptions};

    fn request(options: JobOptions) -> FetchRequest {
        FetchRequest {
            job_id: JobId::from_string("abc"),
            url: "https://example.com/watch?v=1".to_string(),
            options,
            output_dir: PathBuf::from("/data"),
        }
    }

    fn pair(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_default_selection_merges_to_mp4() {
        let fetcher = YtDlpFetcher::default();
        let args = fetcher.build_args(&request(JobOptions::default()));

        assert_eq!(pair(&args, "-f").as_deref(), Some("bestvideo+bestaudio/best"));
        assert_eq!(pair(&args, "--merge-output-format").as_deref(), Some("mp4"));
        assert_eq!(pair(&args, "--max-filesize").as_deref(), Some("1000M"));
        assert_eq!(pair(&args, "-o").as_deref(), Some("/data/abc_%(title)s.%(ext)s"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--progress".to_string()));
        assert!(args.iter().any(|a| a.starts_with("download:[mediadl] download")));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=1"));
    }

    #[test]
    fn test_audio_only_extracts_mp3() {
        let fetcher = YtDlpFetcher::default();
        let args = fetcher.build_args(&request(JobOptions::retrieval(StreamSelection::AudioOnly)));

        assert_eq!(pair(&args, "-f").as_deref(), Some("bestaudio"));
        assert!(args.contains(&"--extract-audio".to_string()));
        assert_eq!(pair(&args, "--audio-format").as_deref(), Some("mp3"));
        assert_eq!(pair(&args, "--audio-quality").as_deref(), Some("192K"));
    }

    #[test]
    fn test_explicit_format_overrides_selection() {
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            max_filesize_mb: 50,
            ..Default::default()
        });
        let options = JobOptions {
            format_id: Some("137+140".to_string()),
            stream_selection: Some(StreamSelection::VideoOnly),
            ..Default::default()
        };
        let args = fetcher.build_args(&request(options));

        assert_eq!(pair(&args, "-f").as_deref(), Some("137+140"));
        assert_eq!(pair(&args, "--recode-video").as_deref(), Some("mp4"));
        assert_eq!(pair(&args, "--max-filesize").as_deref(), Some("50M"));
    }

    #[cfg(unix)]
    fn fake_ytdlp(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_forwards_progress_and_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let binary = fake_ytdlp(
            dir.path(),
            "echo '[mediadl] title Clip'\n\
             echo '[mediadl] size 4096'\n\
             echo '[mediadl] thumbnail https://i.example.com/clip.jpg'\n\
             echo '[mediadl] download 1024 4096 NA'\n\
             echo '[mediadl] file /data/abc_Clip.mp4'",
        );
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            binary,
            ..Default::default()
        });

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        let progress: ProgressFn = std::sync::Arc::new(move |signal: ProgressSignal| {
            sink.lock().unwrap().push(signal)
        });
        let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

        let outcome = fetcher
            .fetch(request(JobOptions::default()), progress, cancel_rx)
            .await
            .unwrap();

        assert_eq!(outcome.title.as_deref(), Some("Clip"));
        assert_eq!(outcome.thumbnail.as_deref(), Some("https://i.example.com/clip.jpg"));
        assert_eq!(outcome.path, Some(PathBuf::from("/data/abc_Clip.mp4")));
        assert!(seen
            .lock()
            .unwrap()
            .contains(&ProgressSignal::ratio(1024, 4096)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_over_size_limit_is_resource_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        // Quiet mode: no skip notice, no file line
        let binary = fake_ytdlp(
            dir.path(),
            "echo '[mediadl] title Big'\n\
             echo '[mediadl] size 2097152'",
        );
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            binary,
            max_filesize_mb: 1,
            ..Default::default()
        });

        let progress: ProgressFn = std::sync::Arc::new(|_: ProgressSignal| {});
        let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

        let err = fetcher
            .fetch(request(JobOptions::default()), progress, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ResourceLimit(_)));
    }

    #[test]
    fn test_info_args_skip_download() {
        let fetcher = YtDlpFetcher::default();
        let args = fetcher.build_info_args("https://example.com/watch?v=1");

        assert_eq!(args.first().map(String::as_str), Some("-J"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.iter().any(|a| a == "-o"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_info_parses_dump() {
        let dir = tempfile::TempDir::new().unwrap();
        let binary = fake_ytdlp(
            dir.path(),
            r#"echo '{"id": "1", "title": "Clip", "thumbnail": "https://i.example.com/1.jpg", "formats": [{"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a"}]}'"#,
        );
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            binary,
            ..Default::default()
        });

        let info = fetcher.info("https://example.com/watch?v=1").await.unwrap();
        assert_eq!(info.title, "Clip");
        assert_eq!(info.thumbnail.as_deref(), Some("https://i.example.com/1.jpg"));
        assert_eq!(info.formats.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_info_failure_is_download_failed() {
        let dir = tempfile::TempDir::new().unwrap();
        let binary = fake_ytdlp(
            dir.path(),
            "echo 'ERROR: [generic] Unsupported URL' >&2\nexit 1",
        );
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            binary,
            ..Default::default()
        });

        let err = fetcher.info("https://example.com/nothing").await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(err.to_string().contains("Unsupported URL"));
    }
}
