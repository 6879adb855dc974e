//! Encoded segment bookkeeping.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::encoding::EncoderTier;
use crate::interval::Interval;

/// One independently encoded keep interval.
///
/// `index` is the segment's position in the keep-interval sequence and is
/// the only ordering that matters downstream: concatenation follows index
/// order, never filesystem discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the keep-interval sequence
    pub index: usize,
    /// Source span this segment was cut from
    pub source: Interval,
    /// Encoded file inside the run's temp directory
    pub path: PathBuf,
    /// Tier that produced the file (software after a fallback)
    pub tier: EncoderTier,
}

impl Segment {
    /// Canonical segment file name for a keep-interval index.
    pub fn file_name(index: usize) -> String {
        format!("part_{:04}.mp4", index)
    }

    /// Duration of the source span in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.source.duration_secs()
    }
}
