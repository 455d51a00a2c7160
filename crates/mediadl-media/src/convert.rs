//! Format transforms using FFmpeg and ImageMagick.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use mediadl_models::{JobOptions, ResizeMode};

use crate::capability::{
    CancelSignal, ProgressFn, TransformOutcome, TransformRequest, Transformer,
};
use crate::command::{FfmpegCommand, ToolRunner};
use crate::error::{MediaError, MediaResult};
use crate::formats::{self, MediaKind};
use crate::probe::probe_duration;
use crate::progress::FfmpegProgress;

/// Transform driver configuration.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// ImageMagick `convert` (or `magick`) binary
    pub imagemagick: PathBuf,
    /// Image quality used when the job does not set one
    pub default_image_quality: u8,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            imagemagick: PathBuf::from("convert"),
            default_image_quality: 90,
        }
    }
}

/// [`Transformer`] that picks ImageMagick for images and FFmpeg for
/// audio/video.
#[derive(Debug, Clone, Default)]
pub struct ToolTransformer {
    config: TransformerConfig,
}

impl ToolTransformer {
    pub fn new(config: TransformerConfig) -> Self {
        Self { config }
    }

    /// Build the ImageMagick argument list.
    pub fn image_args(&self, source: &Path, output: &Path, options: &JobOptions) -> Vec<String> {
        let mut args = vec![source.to_string_lossy().to_string()];

        if options.width.is_some() || options.height.is_some() {
            let geometry = format!(
                "{}x{}",
                options.width.map(|w| w.to_string()).unwrap_or_default(),
                options.height.map(|h| h.to_string()).unwrap_or_default()
            );
            match options.resize_mode.unwrap_or_default() {
                ResizeMode::Fit => {
                    args.push("-resize".into());
                    args.push(geometry);
                }
                ResizeMode::Fill => {
                    args.push("-resize".into());
                    args.push(format!("{}^", geometry));
                    args.push("-gravity".into());
                    args.push("center".into());
                    args.push("-extent".into());
                    args.push(geometry);
                }
                ResizeMode::Stretch => {
                    args.push("-resize".into());
                    args.push(format!("{}!", geometry));
                }
            }
        }

        let quality = options.quality.unwrap_or(self.config.default_image_quality);
        args.push("-quality".into());
        args.push(quality.to_string());

        let target_ext = formats::extension_of(output).unwrap_or_default();
        if !options.preserve_transparency() || !formats::supports_transparency(&target_ext) {
            args.push("-background".into());
            args.push("white".into());
            args.push("-flatten".into());
        }

        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Build the FFmpeg command for an audio or video source.
    pub fn ffmpeg_command(
        &self,
        source_kind: MediaKind,
        source: &Path,
        output: &Path,
        options: &JobOptions,
    ) -> FfmpegCommand {
        let target = formats::extension_of(output)
            .and_then(|ext| formats::lookup(&ext).copied());
        let target_kind = target.map(|f| f.kind);
        let mut cmd = FfmpegCommand::new(source, output);

        if source_kind == MediaKind::Video && target_kind == Some(MediaKind::Audio) {
            cmd = cmd.no_video();
        }

        if target_kind != Some(MediaKind::Audio) {
            if let Some(codec) = &options.video_codec {
                cmd = cmd.video_codec(codec);
            }
            if let Some(bitrate) = &options.video_bitrate {
                cmd = cmd.video_bitrate(bitrate);
            }
            if let Some(fps) = options.fps {
                cmd = cmd.frame_rate(fps);
            }
            if let (Some(w), Some(h)) = (options.width, options.height) {
                cmd = cmd.scale(w, h);
            }
        }

        // Audio targets fall back to the table's codec
        let audio_codec = options
            .audio_codec
            .clone()
            .or_else(|| target.and_then(|f| f.audio_codec).map(str::to_string));
        if let Some(codec) = audio_codec {
            cmd = cmd.audio_codec(codec);
        }
        if let Some(bitrate) = &options.audio_bitrate {
            cmd = cmd.audio_bitrate(bitrate);
        }

        if let Some(start) = options.start_time {
            cmd = cmd.start(start);
        }
        if let Some(end) = options.end_time {
            cmd = cmd.end(end);
        }

        cmd
    }

    async fn run_imagemagick(
        &self,
        request: &TransformRequest,
        cancel: CancelSignal,
    ) -> MediaResult<()> {
        let args = self.image_args(&request.source, &request.output, &request.options);
        let output = ToolRunner::new(&self.config.imagemagick)
            .with_cancel(cancel)
            .run(&args, |line| debug!(job_id = %request.job_id, "imagemagick: {}", line))
            .await?;

        if !output.success() {
            return Err(MediaError::conversion_failed(
                format!(
                    "ImageMagick exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
                Some(output.stderr_tail),
                output.status.code(),
            ));
        }
        Ok(())
    }

    async fn run_ffmpeg(
        &self,
        source_kind: MediaKind,
        request: &TransformRequest,
        progress: &ProgressFn,
        cancel: CancelSignal,
    ) -> MediaResult<()> {
        let duration = match probe_duration(&self.config.ffprobe, &request.source).await {
            Ok(d) => Some(clipped_duration(d, &request.options)),
            Err(e) => {
                // Progress stays indeterminate
                debug!(job_id = %request.job_id, error = %e, "Could not probe duration");
                None
            }
        };

        let cmd = self.ffmpeg_command(source_kind, &request.source, &request.output, &request.options);
        let mut current = FfmpegProgress::default();

        let output = ToolRunner::new(&self.config.ffmpeg)
            .with_cancel(cancel)
            .run(&cmd.build_args(), |line| {
                if let Some(snapshot) = current.parse_line(line) {
                    if let Some(signal) = duration.and_then(|d| snapshot.to_signal(d)) {
                        progress(signal);
                    }
                }
            })
            .await?;

        if !output.success() {
            let message = output
                .last_error_line()
                .map(str::to_string)
                .unwrap_or_else(|| "FFmpeg exited with non-zero status".to_string());
            return Err(MediaError::conversion_failed(
                message,
                Some(output.stderr_tail),
                output.status.code(),
            ));
        }
        Ok(())
    }
}

/// Duration of the kept range, given the full media duration.
fn clipped_duration(duration: f64, options: &JobOptions) -> f64 {
    let end = options.end_time.map(|e| e.min(duration)).unwrap_or(duration);
    let start = options.start_time.unwrap_or(0.0);
    (end - start).max(0.0)
}

#[async_trait]
impl Transformer for ToolTransformer {
    async fn transform(
        &self,
        request: TransformRequest,
        progress: ProgressFn,
        cancel: CancelSignal,
    ) -> MediaResult<TransformOutcome> {
        let source_kind = formats::kind_of(&request.source).ok_or_else(|| {
            MediaError::unsupported_format(format!(
                "unknown source format: {}",
                request.source.display()
            ))
        })?;
        let source_ext = formats::extension_of(&request.source).unwrap_or_default();

        if !formats::can_convert(source_kind, &source_ext, &request.target_format) {
            return Err(MediaError::unsupported_format(format!(
                "cannot convert {} to {}",
                source_ext, request.target_format
            )));
        }

        info!(
            job_id = %request.job_id,
            source = %request.source.display(),
            target = %request.target_format,
            kind = source_kind.as_str(),
            "Starting transform"
        );

        match source_kind {
            MediaKind::Image => self.run_imagemagick(&request, cancel).await?,
            MediaKind::Video | MediaKind::Audio => {
                self.run_ffmpeg(source_kind, &request, &progress, cancel).await?
            }
            MediaKind::Document => {
                // Only same-format requests reach here
                tokio::fs::copy(&request.source, &request.output).await?;
            }
        }

        if !request.output.exists() {
            warn!(job_id = %request.job_id, "Transform produced no output file");
            return Err(MediaError::conversion_failed(
                "Output file not created",
                None,
                None,
            ));
        }

        Ok(TransformOutcome {
            output: request.output,
        })
    }
}
