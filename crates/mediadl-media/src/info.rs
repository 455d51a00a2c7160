//! Asset metadata from `yt-dlp -J`.

use serde::Deserialize;

use mediadl_models::{FormatKind, MediaFormat, MediaInfo};

use crate::error::MediaResult;

/// The subset of the yt-dlp info dict we expose.
#[derive(Debug, Deserialize)]
struct InfoDict {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    description: Option<String>,
    uploader: Option<String>,
    upload_date: Option<String>,
    view_count: Option<u64>,
    #[serde(default)]
    formats: Vec<FormatDict>,
}

#[derive(Debug, Deserialize)]
struct FormatDict {
    #[serde(default)]
    format_id: String,
    format_note: Option<String>,
    #[serde(default)]
    ext: String,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

impl From<FormatDict> for MediaFormat {
    fn from(f: FormatDict) -> Self {
        let resolution = match (f.width, f.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        };
        let filesize = f.filesize.or_else(|| {
            f.filesize_approx
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
        });

        Self {
            kind: FormatKind::from_codecs(f.vcodec.as_deref(), f.acodec.as_deref()),
            format_id: f.format_id,
            format_note: f.format_note,
            ext: f.ext,
            resolution,
            fps: f.fps,
            filesize,
        }
    }
}

/// Parse the single-line JSON printed by `yt-dlp -J`.
pub fn parse_info_json(json: &str) -> MediaResult<MediaInfo> {
    let dict: InfoDict = serde_json::from_str(json)?;

    Ok(MediaInfo {
        id: dict.id,
        title: dict.title,
        duration: dict.duration,
        thumbnail: dict.thumbnail,
        description: dict.description,
        uploader: dict.uploader,
        upload_date: dict.upload_date,
        view_count: dict.view_count,
        formats: dict.formats.into_iter().map(MediaFormat::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_json() {
        let json = r#"{
            "id": "dQw4", "title": "Clip", "duration": 212.0,
            "thumbnail": "https://i.example.com/dQw4.jpg", "uploader": "someone",
            "upload_date": "20091025", "view_count": 42, "extractor": "youtube",
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 3433514},
                {"format_id": "137", "ext": "mp4", "width": 1920, "height": 1080, "fps": 25,
                 "vcodec": "avc1.640028", "acodec": "none", "filesize_approx": 80000000.5},
                {"format_id": "18", "format_note": "360p", "ext": "mp4", "width": 640, "height": 360,
                 "vcodec": "avc1.42001E", "acodec": "mp4a.40.2"}
            ]
        }"#;

        let info = parse_info_json(json).unwrap();
        assert_eq!(info.id, "dQw4");
        assert_eq!(info.title, "Clip");
        assert_eq!(info.thumbnail.as_deref(), Some("https://i.example.com/dQw4.jpg"));
        assert_eq!(info.view_count, Some(42));
        assert_eq!(info.formats.len(), 3);

        let audio = &info.formats[0];
        assert_eq!(audio.kind, FormatKind::Audio);
        assert_eq!(audio.resolution, None);
        assert_eq!(audio.filesize, Some(3_433_514));

        let video = &info.formats[1];
        assert_eq!(video.kind, FormatKind::Video);
        assert_eq!(video.resolution.as_deref(), Some("1920x1080"));
        assert_eq!(video.filesize, Some(80_000_000));

        let muxed = &info.formats[2];
        assert_eq!(muxed.kind, FormatKind::VideoAudio);
        assert_eq!(muxed.format_note.as_deref(), Some("360p"));
    }

    #[test]
    fn test_parse_info_json_tolerates_sparse_output() {
        let info = parse_info_json(r#"{"title": "Direct file"}"#).unwrap();
        assert_eq!(info.title, "Direct file");
        assert!(info.id.is_empty());
        assert!(info.formats.is_empty());

        assert!(parse_info_json("ERROR: Unsupported URL").is_err());
    }
}
