//! FFprobe source inspection.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Probed source information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Duration in seconds
    pub duration_secs: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub video_codec: String,
    /// Whether the container carries an audio stream
    pub has_audio: bool,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Immutable reference to an input container, probed once at open.
#[derive(Debug, Clone)]
pub struct MediaSource {
    path: PathBuf,
    info: SourceInfo,
}

impl MediaSource {
    /// Open a source file, probing its streams and duration.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let info = probe_source(path).await?;
        debug!(
            path = %path.display(),
            duration_secs = info.duration_secs,
            has_audio = info.has_audio,
            codec = %info.video_codec,
            "Opened media source"
        );
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    /// Source file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Probed information.
    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Probed duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.info.duration_secs
    }
}

#[cfg(test)]
impl MediaSource {
    /// Construct a source with canned info, bypassing ffprobe.
    pub(crate) fn with_info(path: impl Into<PathBuf>, info: SourceInfo) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a source file for stream and duration information.
async fn probe_source(path: &Path) -> MediaResult<SourceInfo> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    source_info_from_probe(probe)
}

/// Map raw ffprobe JSON into [`SourceInfo`].
fn source_info_from_probe(probe: FfprobeOutput) -> MediaResult<SourceInfo> {
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration_secs = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // Everything downstream positions against the duration, so a container
    // that does not report one is unusable.
    if duration_secs <= 0.0 {
        return Err(MediaError::InvalidVideo(
            "Container reports no duration".to_string(),
        ));
    }

    let size_bytes = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(SourceInfo {
        duration_secs,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        video_codec: video_stream.codec_name.clone().unwrap_or_default(),
        has_audio,
        size_bytes,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
    }

    fn probe_from_json(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_source_info_with_audio() {
        let probe = probe_from_json(
            r#"{
                "format": { "duration": "30.000000", "size": "1048576" },
                "streams": [
                    { "codec_type": "video", "codec_name": "h264",
                      "width": 1920, "height": 1080,
                      "avg_frame_rate": "30/1", "r_frame_rate": "30/1" },
                    { "codec_type": "audio", "codec_name": "aac" }
                ]
            }"#,
        );

        let info = source_info_from_probe(probe).unwrap();
        assert!((info.duration_secs - 30.0).abs() < 1e-9);
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.fps - 30.0).abs() < 0.01);
        assert_eq!(info.video_codec, "h264");
        assert!(info.has_audio);
        assert_eq!(info.size_bytes, 1048576);
    }

    #[test]
    fn test_source_info_without_audio() {
        let probe = probe_from_json(
            r#"{
                "format": { "duration": "12.5" },
                "streams": [
                    { "codec_type": "video", "codec_name": "hevc",
                      "width": 1280, "height": 720, "r_frame_rate": "25/1" }
                ]
            }"#,
        );

        let info = source_info_from_probe(probe).unwrap();
        assert!(!info.has_audio);
        assert!((info.fps - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_source_info_rejects_audio_only() {
        let probe = probe_from_json(
            r#"{
                "format": { "duration": "30.0" },
                "streams": [ { "codec_type": "audio", "codec_name": "mp3" } ]
            }"#,
        );

        assert!(matches!(
            source_info_from_probe(probe),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[test]
    fn test_source_info_rejects_missing_duration() {
        let probe = probe_from_json(
            r#"{
                "format": {},
                "streams": [
                    { "codec_type": "video", "codec_name": "h264",
                      "width": 640, "height": 480 }
                ]
            }"#,
        );

        assert!(matches!(
            source_info_from_probe(probe),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
