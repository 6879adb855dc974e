//! Shared data models for the GapCut pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Time intervals and keep-interval computation
//! - Encoder tiers and quality profiles
//! - Encoded segments
//! - Run identifiers and pipeline results

pub mod encoding;
pub mod interval;
pub mod run;
pub mod segment;

// Re-export common types
pub use encoding::{EncoderProfile, EncoderTier, HARDWARE_CODEC_PRIORITY};
pub use interval::{keep_intervals, Interval, IntervalError, MIN_SPAN_SECS};
pub use run::{PipelineResult, RunId};
pub use segment::Segment;
