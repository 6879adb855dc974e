//! Crate-wide error type for FFmpeg-backed operations.
//!
//! Component-specific failures (extraction, concatenation) carry their
//! own enums and wrap [`MediaError`] where a process invocation sits
//! underneath.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors raised by probing, encoding and the processes behind them.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Not a processable video: {0}")]
    InvalidVideo(String),

    #[error("FFmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        /// Last diagnostic lines FFmpeg wrote before exiting.
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFmpeg run exceeded {0}s and was killed")]
    Timeout(u64),

    #[error("Cancelled by caller")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed ffprobe JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Build an [`MediaError::FfmpegFailed`] from a process outcome.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr_tail,
            exit_code,
        }
    }
}
