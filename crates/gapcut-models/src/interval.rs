//! Time intervals in source seconds and keep-interval computation.
//!
//! Silence detection produces intervals of quiet audio; the complement of
//! those intervals against the source duration is the list of spans worth
//! keeping. Both sides of that computation live here so the cutter and the
//! concatenator can share one validated representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spans shorter than this are treated as empty and never produce a
/// keep interval or a segment.
pub const MIN_SPAN_SECS: f64 = 0.001;

/// Half-open time interval `[start, end)` in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Start time in seconds from the beginning of the source.
    pub start_secs: f64,
    /// End time in seconds, strictly greater than `start_secs`.
    pub end_secs: f64,
}

/// Interval validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntervalError {
    /// One or both bounds are NaN or infinite
    #[error("interval bounds must be finite (got {start}..{end})")]
    NonFinite { start: f64, end: f64 },
    /// Start time is negative
    #[error("interval start cannot be negative (got {0})")]
    NegativeStart(f64),
    /// Start time is not strictly before end time
    #[error("interval start ({start}) must be before end ({end})")]
    StartNotBeforeEnd { start: f64, end: f64 },
}

impl Interval {
    /// Create a validated interval.
    pub fn new(start_secs: f64, end_secs: f64) -> Result<Self, IntervalError> {
        if !start_secs.is_finite() || !end_secs.is_finite() {
            return Err(IntervalError::NonFinite {
                start: start_secs,
                end: end_secs,
            });
        }
        if start_secs < 0.0 {
            return Err(IntervalError::NegativeStart(start_secs));
        }
        if start_secs >= end_secs {
            return Err(IntervalError::StartNotBeforeEnd {
                start: start_secs,
                end: end_secs,
            });
        }
        Ok(Self {
            start_secs,
            end_secs,
        })
    }

    /// Interval length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s..{:.3}s", self.start_secs, self.end_secs)
    }
}

/// Compute the keep intervals: the complement of `silences` against
/// `[0, duration_secs)`.
///
/// The input does not need to be sorted or disjoint; silences are sorted,
/// clamped to the source range and merged before the complement is taken.
/// Spans shorter than [`MIN_SPAN_SECS`] are dropped on both sides. The
/// result is sorted, non-overlapping and strictly increasing.
///
/// Returns an empty vector when silence covers the entire source; returns
/// a single `[0, duration)` interval when `silences` is empty.
pub fn keep_intervals(silences: &[Interval], duration_secs: f64) -> Vec<Interval> {
    if duration_secs <= MIN_SPAN_SECS {
        return Vec::new();
    }

    // Clamp to the source range, then sort and merge overlapping input.
    let mut clamped: Vec<(f64, f64)> = silences
        .iter()
        .filter(|s| s.start_secs < duration_secs && s.end_secs > 0.0)
        .map(|s| (s.start_secs.max(0.0), s.end_secs.min(duration_secs)))
        .filter(|(start, end)| end - start > 0.0)
        .collect();
    clamped.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(clamped.len());
    for (start, end) in clamped {
        match merged.last_mut() {
            Some((_, prev_end)) if start <= *prev_end => {
                *prev_end = prev_end.max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    let mut keeps = Vec::with_capacity(merged.len() + 1);
    let mut cursor = 0.0_f64;
    for (start, end) in merged {
        if start - cursor > MIN_SPAN_SECS {
            keeps.push(Interval {
                start_secs: cursor,
                end_secs: start,
            });
        }
        cursor = cursor.max(end);
    }
    if duration_secs - cursor > MIN_SPAN_SECS {
        keeps.push(Interval {
            start_secs: cursor,
            end_secs: duration_secs,
        });
    }

    keeps
}
