//! Format table: media kinds, MIME types and conversion rules.

use std::path::Path;

/// Fallback MIME type for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Broad media kind of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// One row of the format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub ext: &'static str,
    pub mime: &'static str,
    pub kind: MediaKind,
    /// Whether the format can carry an alpha channel
    pub transparent: bool,
    /// Default FFmpeg audio codec for audio targets
    pub audio_codec: Option<&'static str>,
}

const fn image(ext: &'static str, mime: &'static str, transparent: bool) -> FormatInfo {
    FormatInfo {
        ext,
        mime,
        kind: MediaKind::Image,
        transparent,
        audio_codec: None,
    }
}

const fn video(ext: &'static str, mime: &'static str) -> FormatInfo {
    FormatInfo {
        ext,
        mime,
        kind: MediaKind::Video,
        transparent: false,
        audio_codec: None,
    }
}

const fn audio(ext: &'static str, mime: &'static str, codec: &'static str) -> FormatInfo {
    FormatInfo {
        ext,
        mime,
        kind: MediaKind::Audio,
        transparent: false,
        audio_codec: Some(codec),
    }
}

const fn document(ext: &'static str, mime: &'static str) -> FormatInfo {
    FormatInfo {
        ext,
        mime,
        kind: MediaKind::Document,
        transparent: false,
        audio_codec: None,
    }
}

// Order matters: gif resolves to an image before the video table is consulted.
static FORMATS: &[FormatInfo] = &[
    image("png", "image/png", true),
    image("jpg", "image/jpeg", false),
    image("jpeg", "image/jpeg", false),
    image("webp", "image/webp", true),
    image("gif", "image/gif", true),
    image("bmp", "image/bmp", false),
    image("tiff", "image/tiff", true),
    image("ico", "image/x-icon", true),
    image("svg", "image/svg+xml", true),
    video("mp4", "video/mp4"),
    video("webm", "video/webm"),
    video("mkv", "video/x-matroska"),
    video("avi", "video/x-msvideo"),
    video("mov", "video/quicktime"),
    video("flv", "video/x-flv"),
    audio("mp3", "audio/mpeg", "mp3"),
    audio("wav", "audio/wav", "pcm_s16le"),
    audio("ogg", "audio/ogg", "vorbis"),
    audio("aac", "audio/aac", "aac"),
    audio("flac", "audio/flac", "flac"),
    audio("m4a", "audio/m4a", "aac"),
    document("pdf", "application/pdf"),
    document("txt", "text/plain"),
    document("md", "text/markdown"),
    document("html", "text/html"),
];

/// Look up a format by extension (case-insensitive, leading dot allowed).
pub fn lookup(ext: &str) -> Option<&'static FormatInfo> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    FORMATS.iter().find(|f| f.ext == ext)
}

/// Lowercased extension of a path.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Media kind of a file, from its extension.
pub fn kind_of(path: &Path) -> Option<MediaKind> {
    extension_of(path).and_then(|ext| lookup(&ext)).map(|f| f.kind)
}

/// MIME type of a file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    extension_of(path)
        .and_then(|ext| lookup(&ext))
        .map(|f| f.mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

pub fn supports_transparency(ext: &str) -> bool {
    lookup(ext).map(|f| f.kind == MediaKind::Image && f.transparent).unwrap_or(false)
}

/// Whether `source_ext` of `source_kind` can be converted to `target_ext`.
pub fn can_convert(source_kind: MediaKind, source_ext: &str, target_ext: &str) -> bool {
    let source_ext = source_ext.trim_start_matches('.').to_ascii_lowercase();
    let target_ext = target_ext.trim_start_matches('.').to_ascii_lowercase();

    if source_ext == target_ext {
        return true;
    }

    let Some(target) = lookup(&target_ext) else {
        return false;
    };

    match source_kind {
        MediaKind::Image => target.kind == MediaKind::Image,
        MediaKind::Video => {
            matches!(target.kind, MediaKind::Video | MediaKind::Audio) || target_ext == "gif"
        }
        MediaKind::Audio => target.kind == MediaKind::Audio,
        MediaKind::Document => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_content_type() {
        assert_eq!(lookup("MP4").map(|f| f.kind), Some(MediaKind::Video));
        assert_eq!(lookup(".png").map(|f| f.mime), Some("image/png"));
        assert!(lookup("xyz").is_none());

        assert_eq!(content_type_for(Path::new("/a/b_clip.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("/a/noext")), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("/a/b.bin")), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_gif_is_an_image() {
        assert_eq!(kind_of(Path::new("x.gif")), Some(MediaKind::Image));
        assert!(supports_transparency("gif"));
        assert!(!supports_transparency("jpg"));
    }

    #[test]
    fn test_conversion_rules() {
        assert!(can_convert(MediaKind::Video, "mp4", "mp3"));
        assert!(can_convert(MediaKind::Video, "mp4", "gif"));
        assert!(can_convert(MediaKind::Video, "mp4", "webm"));
        assert!(can_convert(MediaKind::Image, "png", "jpg"));
        assert!(can_convert(MediaKind::Audio, "mp3", "flac"));
        assert!(can_convert(MediaKind::Document, "pdf", "pdf"));

        assert!(!can_convert(MediaKind::Audio, "mp3", "mp4"));
        assert!(!can_convert(MediaKind::Image, "png", "mp4"));
        assert!(!can_convert(MediaKind::Document, "pdf", "txt"));
        assert!(!can_convert(MediaKind::Video, "mp4", "xyz"));
    }
}
