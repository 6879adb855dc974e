//! Run identity and pipeline outcome reporting.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one pipeline run. Also names the run's temp
/// directory, so concurrent runs never collide on intermediate files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a pipeline run that produced an output file.
///
/// A run succeeds even when some segments failed both encoder tiers; those
/// segments are dropped from the output and reported here so the caller
/// can decide whether the loss is acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run this result belongs to
    pub run_id: RunId,
    /// Where the output file was written
    pub output_path: PathBuf,
    /// Segments that made it into the output
    pub succeeded_segments: usize,
    /// Keep-interval indices dropped after both tiers failed, ascending
    pub failed_segment_indices: Vec<usize>,
    /// True when no silence was found and the source passed through
    /// unchanged, with zero re-encodes
    pub fast_path: bool,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock processing time in seconds
    pub elapsed_secs: f64,
}

impl PipelineResult {
    /// Every segment made it into the output.
    pub fn is_complete(&self) -> bool {
        self.failed_segment_indices.is_empty()
    }

    /// The output is usable but some segments were dropped.
    pub fn is_partial(&self) -> bool {
        !self.failed_segment_indices.is_empty()
    }
}
