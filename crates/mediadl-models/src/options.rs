//! Pass-through options for the external capabilities.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Which streams a retrieval should keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum StreamSelection {
    /// Video and audio, merged into mp4
    #[default]
    #[serde(rename = "video+audio")]
    VideoAudio,
    /// Video stream only
    #[serde(rename = "video-only")]
    VideoOnly,
    /// Audio stream only, extracted to mp3
    #[serde(rename = "audio-only")]
    AudioOnly,
}

impl StreamSelection {
    /// Extension of the artifact produced for this selection.
    pub fn output_extension(&self) -> &'static str {
        match self {
            StreamSelection::AudioOnly => "mp3",
            StreamSelection::VideoAudio | StreamSelection::VideoOnly => "mp4",
        }
    }
}

/// Image resize behavior when both dimensions are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Fit inside the box, keeping aspect ratio
    #[default]
    Fit,
    /// Cover the box and crop the overflow
    Fill,
    /// Ignore aspect ratio
    Stretch,
}

/// Options handed to the retrieval or transform capability.
///
/// The engine does not interpret these beyond validation; each capability
/// picks the fields relevant to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobOptions {
    /// Explicit yt-dlp format selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_id: Option<String>,

    /// Stream selection for retrievals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_selection: Option<StreamSelection>,

    /// Target format extension for transforms (e.g. "mp3", "png")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Image quality (1-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_mode: Option<ResizeMode>,

    /// Start of the kept range, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,

    /// End of the kept range, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,

    /// Keep alpha when the target supports it (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_transparency: Option<bool>,
}

impl JobOptions {
    /// Options for a retrieval with the given stream selection.
    pub fn retrieval(stream_selection: StreamSelection) -> Self {
        Self {
            stream_selection: Some(stream_selection),
            ..Default::default()
        }
    }

    /// Options for a transform into `output_format`.
    pub fn transform(output_format: impl Into<String>) -> Self {
        Self {
            output_format: Some(output_format.into()),
            ..Default::default()
        }
    }

    /// Normalized (lowercase, no leading dot) target format.
    pub fn target_format(&self) -> Option<String> {
        self.output_format
            .as_deref()
            .map(|f| f.trim().trim_start_matches('.').to_lowercase())
            .filter(|f| !f.is_empty())
    }

    pub fn stream_selection(&self) -> StreamSelection {
        self.stream_selection.unwrap_or_default()
    }

    pub fn preserve_transparency(&self) -> bool {
        self.preserve_transparency.unwrap_or(true)
    }

    /// Check value ranges.
    pub fn validate(&self) -> ModelResult<()> {
        if let Some(quality) = self.quality {
            if !(1..=100).contains(&quality) {
                return Err(ModelError::invalid_options(format!(
                    "quality must be between 1 and 100, got {}",
                    quality
                )));
            }
        }

        if matches!(self.width, Some(0)) || matches!(self.height, Some(0)) {
            return Err(ModelError::invalid_options("dimensions must be positive"));
        }

        if matches!(self.fps, Some(0)) {
            return Err(ModelError::invalid_options("fps must be positive"));
        }

        for (name, value) in [("start_time", self.start_time), ("end_time", self.end_time)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ModelError::invalid_options(format!(
                        "{} must be a non-negative number",
                        name
                    )));
                }
            }
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(ModelError::invalid_options(
                    "end_time must be greater than start_time",
                ));
            }
        }

        Ok(())
    }
}
