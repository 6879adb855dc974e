//! Energy-based silence detection.
//!
//! Scans mono f32 PCM in fixed 10 ms frames. A frame is silent when its
//! peak amplitude, expressed in dBFS, falls below the configured
//! threshold; a long enough run of silent frames becomes a silent
//! interval. Detection is pure: it never mutates the samples, and the
//! same samples with the same config always produce the same intervals,
//! so a caller can re-run it with different thresholds without
//! re-extracting audio.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gapcut_models::Interval;

/// Analysis frame length in milliseconds.
const FRAME_MS: u64 = 10;

/// Default silence threshold in dBFS
pub const DEFAULT_THRESHOLD_DB: i32 = -40;
/// Most sensitive accepted threshold
pub const MIN_THRESHOLD_DB: i32 = -60;
/// Least sensitive accepted threshold
pub const MAX_THRESHOLD_DB: i32 = -10;
/// Default minimum silence duration
pub const DEFAULT_MIN_SILENCE_MS: u64 = 700;
/// Default speech gap below which adjacent silences merge
pub const DEFAULT_MIN_SPEECH_GAP_MS: u64 = 500;

/// Configuration for silence detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Silence threshold in dBFS.
    ///
    /// - Lower values (-60 to -50): only near-digital-silence is cut
    /// - Default (-40): works well for voice recordings
    /// - Higher values (-30 to -10): quiet speech starts counting as silence
    pub threshold_db: i32,

    /// Minimum silence duration before a run qualifies (milliseconds).
    ///
    /// Runs shorter than this are natural pauses and stay in the output.
    pub min_silence_ms: u64,

    /// Speech gaps shorter than this between two qualifying silences are
    /// absorbed, merging the silences (milliseconds).
    ///
    /// A lone breath or mouse click between two long silences is not
    /// worth keeping as its own segment.
    pub min_speech_gap_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_db: DEFAULT_THRESHOLD_DB,
            min_silence_ms: DEFAULT_MIN_SILENCE_MS,
            min_speech_gap_ms: DEFAULT_MIN_SPEECH_GAP_MS,
        }
    }
}

impl DetectorConfig {
    /// Builder-style setter for the threshold, clamped to the accepted
    /// range.
    pub fn with_threshold_db(mut self, db: i32) -> Self {
        self.threshold_db = db.clamp(MIN_THRESHOLD_DB, MAX_THRESHOLD_DB);
        self
    }

    /// Builder-style setter for minimum silence duration.
    pub fn with_min_silence_ms(mut self, ms: u64) -> Self {
        self.min_silence_ms = ms;
        self
    }

    /// Builder-style setter for the speech gap absorption window.
    pub fn with_min_speech_gap_ms(mut self, ms: u64) -> Self {
        self.min_speech_gap_ms = ms;
        self
    }
}

/// Detector state while walking frames.
enum State {
    InSpeech,
    InSilence { silence_start_ms: u64 },
}

/// Detect silent intervals in mono f32 PCM.
///
/// Returns intervals in ascending source time, non-overlapping. An empty
/// result means nothing qualified; it is not an error.
pub fn detect_silence(samples: &[f32], sample_rate: u32, config: &DetectorConfig) -> Vec<Interval> {
    if samples.is_empty() || sample_rate == 0 {
        return Vec::new();
    }

    let frame_len = ((sample_rate as u64 * FRAME_MS / 1000) as usize).max(1);
    let total_ms = samples.len() as u64 * 1000 / sample_rate as u64;
    let threshold = config.threshold_db as f64;

    let mut runs: Vec<(u64, u64)> = Vec::new();
    let mut state = State::InSpeech;

    for (i, frame) in samples.chunks(frame_len).enumerate() {
        let frame_start_ms = i as u64 * FRAME_MS;
        let silent = frame_dbfs(frame) < threshold;

        match (&state, silent) {
            (State::InSpeech, true) => {
                state = State::InSilence {
                    silence_start_ms: frame_start_ms,
                };
            }
            (State::InSilence { silence_start_ms }, false) => {
                let run_ms = frame_start_ms.saturating_sub(*silence_start_ms);
                if run_ms >= config.min_silence_ms {
                    runs.push((*silence_start_ms, frame_start_ms));
                }
                state = State::InSpeech;
            }
            _ => {}
        }
    }

    // A run still open at the end of the stream closes at the total
    // duration.
    if let State::InSilence { silence_start_ms } = state {
        if total_ms.saturating_sub(silence_start_ms) >= config.min_silence_ms {
            runs.push((silence_start_ms, total_ms));
        }
    }

    let merged = absorb_speech_gaps(runs, config.min_speech_gap_ms);

    let intervals: Vec<Interval> = merged
        .into_iter()
        .filter_map(|(start_ms, end_ms)| {
            Interval::new(start_ms as f64 / 1000.0, end_ms as f64 / 1000.0).ok()
        })
        .collect();

    debug!(
        samples = samples.len(),
        total_ms,
        threshold_db = config.threshold_db,
        silent_intervals = intervals.len(),
        "Silence detection complete"
    );

    intervals
}

/// Peak amplitude of a frame in dBFS.
fn frame_dbfs(frame: &[f32]) -> f64 {
    let peak = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
    // The epsilon keeps log10 defined for digital silence.
    20.0 * (peak as f64 + 1e-10).log10()
}

/// Merge silence runs separated by speech gaps shorter than
/// `min_speech_gap_ms`. Input runs are ascending and disjoint.
fn absorb_speech_gaps(runs: Vec<(u64, u64)>, min_speech_gap_ms: u64) -> Vec<(u64, u64)> {
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(runs.len());
    for (start, end) in runs {
        match merged.last_mut() {
            Some((_, prev_end)) if start.saturating_sub(*prev_end) < min_speech_gap_ms => {
                *prev_end = end;
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}
