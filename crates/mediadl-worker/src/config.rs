//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use mediadl_models::JobFamily;

/// Per-family execution limits.
#[derive(Debug, Clone)]
pub struct FamilyConfig {
    /// Long-lived workers draining the family queue
    pub workers: usize,
    /// Simultaneous external invocations
    pub permits: usize,
    /// Deadline of a single invocation
    pub timeout: Duration,
}

/// External tool locations.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub imagemagick: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            imagemagick: PathBuf::from("convert"),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Artifact root directory
    pub storage_dir: PathBuf,
    /// Queue capacity, per family
    pub queue_capacity: usize,
    pub retrieval: FamilyConfig,
    pub transform: FamilyConfig,
    /// Maximum retrieval size in megabytes
    pub max_file_size_mb: u64,
    /// Maximum transform input size in megabytes
    pub max_conversion_size_mb: u64,
    /// Image quality when a transform does not set one
    pub default_image_quality: u8,
    /// Sweeper interval
    pub cleanup_interval: Duration,
    /// Age after which unreferenced artifacts are removed
    pub artifact_retention: Duration,
    /// Age after which terminal records are removed
    pub record_retention: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    pub tools: ToolPaths,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("/tmp/mediadl"),
            queue_capacity: 100,
            retrieval: FamilyConfig {
                workers: 3,
                permits: 3,
                timeout: Duration::from_secs(3600), // 1 hour
            },
            transform: FamilyConfig {
                workers: 1,
                permits: 1,
                timeout: Duration::from_secs(600),
            },
            max_file_size_mb: 1000,
            max_conversion_size_mb: 500,
            default_image_quality: 90,
            cleanup_interval: Duration::from_secs(300),
            artifact_retention: Duration::from_secs(3600),
            record_retention: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(30),
            tools: ToolPaths::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let retrieval_workers = env_parse("RETRIEVAL_WORKERS").unwrap_or(defaults.retrieval.workers);
        // Transforms are heavier; default to half the retrieval pool
        let transform_default = (retrieval_workers / 2).max(1);

        Self {
            storage_dir: std::env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            queue_capacity: env_parse("QUEUE_MAX_SIZE").unwrap_or(defaults.queue_capacity),
            retrieval: FamilyConfig {
                workers: retrieval_workers,
                permits: env_parse("RETRIEVAL_PERMITS").unwrap_or(retrieval_workers),
                timeout: Duration::from_secs(env_parse("DOWNLOAD_TIMEOUT").unwrap_or(3600)),
            },
            transform: FamilyConfig {
                workers: env_parse("TRANSFORM_WORKERS").unwrap_or(transform_default),
                permits: env_parse("TRANSFORM_PERMITS").unwrap_or(transform_default),
                timeout: Duration::from_secs(env_parse("CONVERSION_TIMEOUT").unwrap_or(600)),
            },
            max_file_size_mb: env_parse("MAX_FILE_SIZE_MB").unwrap_or(defaults.max_file_size_mb),
            max_conversion_size_mb: env_parse("MAX_CONVERSION_SIZE_MB")
                .unwrap_or(defaults.max_conversion_size_mb),
            default_image_quality: env_parse::<u8>("DEFAULT_IMAGE_QUALITY")
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(defaults.default_image_quality),
            cleanup_interval: Duration::from_secs(env_parse("CLEANUP_INTERVAL").unwrap_or(300)),
            artifact_retention: Duration::from_secs(
                env_parse("ARTIFACT_RETENTION").unwrap_or(3600),
            ),
            record_retention: Duration::from_secs(env_parse("RECORD_RETENTION").unwrap_or(1800)),
            shutdown_timeout: Duration::from_secs(env_parse("SHUTDOWN_TIMEOUT").unwrap_or(30)),
            tools: ToolPaths {
                ytdlp: std::env::var("YTDLP_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.tools.ytdlp),
                ffmpeg: std::env::var("FFMPEG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.tools.ffmpeg),
                ffprobe: std::env::var("FFPROBE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.tools.ffprobe),
                imagemagick: std::env::var("IMAGEMAGICK_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.tools.imagemagick),
            },
        }
    }

    /// Limits of one family.
    pub fn family(&self, family: JobFamily) -> &FamilyConfig {
        match family {
            JobFamily::Retrieval => &self.retrieval,
            JobFamily::Transform => &self.transform,
        }
    }

    /// Maximum transform input size in bytes.
    pub fn max_conversion_bytes(&self) -> u64 {
        self.max_conversion_size_mb * 1024 * 1024
    }
}
