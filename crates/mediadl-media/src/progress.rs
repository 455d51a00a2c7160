//! Progress parsing for FFmpeg and yt-dlp output.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use mediadl_models::ProgressSignal;

/// Prefix of the machine-readable lines requested from yt-dlp.
pub const YTDLP_LINE_PREFIX: &str = "[mediadl]";

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Convert to a ratio signal against the probed duration.
    pub fn to_signal(&self, total_duration_secs: f64) -> Option<ProgressSignal> {
        if total_duration_secs <= 0.0 || self.out_time_us < 0 {
            return None;
        }
        let total_ms = (total_duration_secs * 1000.0) as u64;
        let done_ms = (self.out_time_us / 1000) as u64;
        Some(ProgressSignal::ratio(done_ms, total_ms))
    }

    /// Feed one `key=value` line. Returns a snapshot at each block end.
    pub fn parse_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;

        match key {
            // out_time_ms is also microseconds in FFmpeg's output
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = us;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }

        None
    }
}

/// A parsed yt-dlp output line.
#[derive(Debug, Clone, PartialEq)]
pub enum YtDlpEvent {
    /// Progress to forward to the reporter
    Progress(ProgressSignal),
    /// Announced size of the selected format, in bytes
    Size(u64),
    /// Thumbnail URL of the asset
    Thumbnail(String),
    /// The asset exceeds `--max-filesize` and was skipped
    TooLarge,
}

/// Parse one line of yt-dlp stdout.
///
/// Recognizes the templated lines requested by the driver:
///
/// ```text
/// [mediadl] download <downloaded> <total> <estimate>
/// [mediadl] postprocess <postprocessor> <status>
/// [mediadl] title <title>
/// [mediadl] size <bytes>
/// [mediadl] thumbnail <url>
/// [mediadl] file <final path>
/// ```
///
/// plus yt-dlp's own "larger than max-filesize" notice. Byte counts may be
/// `NA` when unknown.
pub fn parse_ytdlp_line(line: &str) -> Option<YtDlpEvent> {
    let line = line.trim();

    if line.contains("larger than max-filesize") {
        return Some(YtDlpEvent::TooLarge);
    }

    let rest = line.strip_prefix(YTDLP_LINE_PREFIX)?.trim_start();
    let (kind, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    let rest = rest.trim();

    let signal = match kind {
        "download" => {
            let mut fields = rest.split_whitespace().map(parse_bytes);
            let done = fields.next().flatten()?;
            let total = fields.next().flatten();
            let estimate = fields.next().flatten();
            let total = total.or(estimate)?;
            ProgressSignal::ratio(done, total)
        }
        "postprocess" => {
            let name = rest.split_whitespace().next().unwrap_or("postprocess");
            ProgressSignal::phase(name)
        }
        "size" => return parse_bytes(rest).map(YtDlpEvent::Size),
        "thumbnail" if !rest.is_empty() && rest != "NA" => {
            return Some(YtDlpEvent::Thumbnail(rest.to_string()));
        }
        "title" if !rest.is_empty() => ProgressSignal::Title {
            title: rest.to_string(),
        },
        "file" if !rest.is_empty() => ProgressSignal::finished(Some(PathBuf::from(rest))),
        _ => return None,
    };

    Some(YtDlpEvent::Progress(signal))
}

fn parse_bytes(field: &str) -> Option<u64> {
    // Estimates are printed as floats
    field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64)
}
