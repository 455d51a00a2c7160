//! Metadata of a remote asset, looked up without retrieving it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Streams carried by one offered format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    VideoAudio,
    Video,
    Audio,
}

impl FormatKind {
    /// Classify from the codec fields, where `"none"` marks a missing stream.
    pub fn from_codecs(vcodec: Option<&str>, acodec: Option<&str>) -> Self {
        let missing = |codec: Option<&str>| codec.map_or(true, |c| c == "none");
        if missing(vcodec) {
            Self::Audio
        } else if missing(acodec) {
            Self::Video
        } else {
            Self::VideoAudio
        }
    }
}

/// One format offered by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaFormat {
    /// Identifier accepted as the `format_id` job option
    pub format_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_note: Option<String>,
    pub ext: String,
    /// `<width>x<height>` for formats with video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Exact or approximate size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    pub kind: FormatKind,
}

/// Descriptive metadata of a remote asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// `YYYYMMDD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}
