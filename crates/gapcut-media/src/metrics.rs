//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const SEGMENTS_ENCODED_TOTAL: &str = "gapcut_segments_encoded_total";
    pub const SEGMENTS_DROPPED_TOTAL: &str = "gapcut_segments_dropped_total";
    pub const ENCODER_FALLBACKS_TOTAL: &str = "gapcut_encoder_fallbacks_total";
    pub const RUNS_COMPLETED_TOTAL: &str = "gapcut_runs_completed_total";
    pub const RUNS_FAILED_TOTAL: &str = "gapcut_runs_failed_total";
    pub const RUN_DURATION_SECONDS: &str = "gapcut_run_duration_seconds";
}

/// Record a segment that made it into the output.
pub fn record_segment_encoded(tier: &str) {
    let labels = [("tier", tier.to_string())];
    counter!(names::SEGMENTS_ENCODED_TOTAL, &labels).increment(1);
}

/// Record a segment dropped after both tiers failed.
pub fn record_segment_dropped() {
    counter!(names::SEGMENTS_DROPPED_TOTAL).increment(1);
}

/// Record a hardware-to-software fallback.
pub fn record_encoder_fallback() {
    counter!(names::ENCODER_FALLBACKS_TOTAL).increment(1);
}

/// Record a completed run.
pub fn record_run_completed(fast_path: bool, duration_secs: f64) {
    let labels = [("fast_path", fast_path.to_string())];
    counter!(names::RUNS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS).record(duration_secs);
}

/// Record a failed run.
pub fn record_run_failed() {
    counter!(names::RUNS_FAILED_TOTAL).increment(1);
}
