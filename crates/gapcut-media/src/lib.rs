#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for silence-driven video cutting.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress parsing from `-progress pipe:2`
//! - Waveform extraction and energy-based silence detection
//! - Hardware encoder resolution with a cached capability probe
//! - Per-segment encoding with hardware-to-software fallback
//! - Concat demuxer joining and a fast pass-through path
//! - Cancellation support via tokio watch channels

pub mod command;
pub mod concat;
pub mod cutter;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod fs_utils;
pub mod metrics;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod waveform;

// Pipeline exports
pub use pipeline::{FastPathMode, PipelineConfig, PipelineError, SilenceCutPipeline};

// Component exports
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::{build_manifest, concat_segments, ConcatError};
pub use cutter::{cut_segments, encode_with_fallback, CutReport, EncodeLimits};
pub use detector::{
    detect_silence, DetectorConfig, DEFAULT_MIN_SILENCE_MS, DEFAULT_MIN_SPEECH_GAP_MS,
    DEFAULT_THRESHOLD_DB, MAX_THRESHOLD_DB, MIN_THRESHOLD_DB,
};
pub use encoder::{CapabilityProbe, EncoderResolver, FfmpegCapabilityProbe};
pub use error::{MediaError, MediaResult};
pub use probe::{MediaSource, SourceInfo};
pub use progress::{
    channel, noop_sender, FfmpegProgress, PipelineEvent, ProgressReceiver, ProgressSender,
};
pub use waveform::{extract_waveform, ExtractionError, WaveformHandle};
