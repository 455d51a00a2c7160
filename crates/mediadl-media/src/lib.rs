//! External media capabilities for the mediadl job engine.
//!
//! This crate provides:
//! - The `Fetcher` / `Transformer` capability contracts
//! - A yt-dlp driver for remote retrieval and metadata lookup
//! - FFmpeg and ImageMagick drivers for format transforms
//! - Progress parsing for both tool families
//! - The format table (kinds, MIME types, conversion rules)
//! - Artifact storage on the local filesystem

pub mod capability;
pub mod command;
pub mod convert;
pub mod error;
pub mod formats;
pub mod info;
pub mod probe;
pub mod progress;
pub mod storage;
pub mod ytdlp;

pub use capability::{
    CancelSignal, FetchOutcome, FetchRequest, Fetcher, ProgressFn, TransformOutcome,
    TransformRequest, Transformer,
};
pub use command::{check_tool, FfmpegCommand, ToolOutput, ToolRunner};
pub use convert::{ToolTransformer, TransformerConfig};
pub use error::{MediaError, MediaResult};
pub use formats::{can_convert, content_type_for, FormatInfo, MediaKind, DEFAULT_CONTENT_TYPE};
pub use info::parse_info_json;
pub use probe::probe_duration;
pub use progress::{parse_ytdlp_line, FfmpegProgress, YtDlpEvent};
pub use storage::{ArtifactEntry, ArtifactStorage};
pub use ytdlp::{YtDlpConfig, YtDlpFetcher};
