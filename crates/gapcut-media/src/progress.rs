//! Progress reporting for pipeline runs.
//!
//! Two layers live here: [`FfmpegProgress`] parsed from FFmpeg's
//! `-progress pipe:2` output, and [`PipelineEvent`] stage transitions
//! emitted by the pipeline so a caller can surface them (CLI output,
//! logging) without being coupled to the transport.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use gapcut_models::EncoderTier;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_duration_ms: i64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }

        let remaining_ms = total_duration_ms - self.out_time_ms;
        if remaining_ms <= 0 {
            return Some(0.0);
        }

        Some((remaining_ms as f64 / 1000.0) / self.speed)
    }
}

/// Stage transition emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Extracting the audio track to a waveform
    ExtractingAudio,

    /// Scanning the waveform for silence
    DetectingSilence { threshold_db: i32 },

    /// Silence scan finished
    SilenceDetected {
        silent_intervals: usize,
        keep_intervals: usize,
    },

    /// No silence found; the source passes through unchanged
    NoSilenceFound,

    /// Encoder resolution finished
    EncoderResolved { label: String, tier: EncoderTier },

    /// Encoding one keep interval
    EncodingSegment {
        index: usize,
        total: usize,
        start_secs: f64,
        duration_secs: f64,
    },

    /// Segment file produced (tier is Software after a fallback)
    SegmentEncoded { index: usize, tier: EncoderTier },

    /// Segment failed both tiers and was dropped
    SegmentFailed { index: usize },

    /// Joining segments into the output file
    Concatenating { segments: usize },

    /// Run finished and the output file exists
    Complete,

    /// Run failed without producing an output
    Failed { error: String },
}

/// Progress sender for async contexts.
///
/// Uses a bounded channel and `try_send` so a slow consumer can never
/// stall an encode; intermediate events are dropped when the channel is
/// full. Only the terminal event matters for correctness and the pipeline
/// emits it exactly once.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<PipelineEvent>,
}

impl ProgressSender {
    /// Create a new progress sender.
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Send a progress event (non-blocking).
    pub fn send(&self, event: PipelineEvent) {
        let _ = self.tx.try_send(event);
    }

    /// Send extracting audio event.
    pub fn extracting_audio(&self) {
        self.send(PipelineEvent::ExtractingAudio);
    }

    /// Send detecting silence event.
    pub fn detecting_silence(&self, threshold_db: i32) {
        self.send(PipelineEvent::DetectingSilence { threshold_db });
    }

    /// Send silence detected event.
    pub fn silence_detected(&self, silent_intervals: usize, keep_intervals: usize) {
        self.send(PipelineEvent::SilenceDetected {
            silent_intervals,
            keep_intervals,
        });
    }

    /// Send no silence found event.
    pub fn no_silence_found(&self) {
        self.send(PipelineEvent::NoSilenceFound);
    }

    /// Send encoder resolved event.
    pub fn encoder_resolved(&self, label: impl Into<String>, tier: EncoderTier) {
        self.send(PipelineEvent::EncoderResolved {
            label: label.into(),
            tier,
        });
    }

    /// Send encoding segment event.
    pub fn encoding_segment(
        &self,
        index: usize,
        total: usize,
        start_secs: f64,
        duration_secs: f64,
    ) {
        self.send(PipelineEvent::EncodingSegment {
            index,
            total,
            start_secs,
            duration_secs,
        });
    }

    /// Send segment encoded event.
    pub fn segment_encoded(&self, index: usize, tier: EncoderTier) {
        self.send(PipelineEvent::SegmentEncoded { index, tier });
    }

    /// Send segment failed event.
    pub fn segment_failed(&self, index: usize) {
        self.send(PipelineEvent::SegmentFailed { index });
    }

    /// Send concatenating event.
    pub fn concatenating(&self, segments: usize) {
        self.send(PipelineEvent::Concatenating { segments });
    }

    /// Send complete event.
    pub fn complete(&self) {
        self.send(PipelineEvent::Complete);
    }

    /// Send failed event.
    pub fn failed(&self, error: impl Into<String>) {
        self.send(PipelineEvent::Failed {
            error: error.into(),
        });
    }
}

/// Progress receiver for collecting events.
pub struct ProgressReceiver {
    rx: mpsc::Receiver<PipelineEvent>,
}

impl ProgressReceiver {
    /// Receive the next progress event.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.rx.recv().await
    }

    /// Try to receive a progress event without blocking.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a progress channel pair.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(32);
    (ProgressSender::new(tx), ProgressReceiver { rx })
}

/// A no-op progress sender for when progress reporting is not needed.
pub fn noop_sender() -> ProgressSender {
    let (tx, _rx) = mpsc::channel(1);
    ProgressSender::new(tx)
}
