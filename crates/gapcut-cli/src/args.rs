//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

use gapcut_media::{
    DEFAULT_MIN_SILENCE_MS, DEFAULT_THRESHOLD_DB, MAX_THRESHOLD_DB, MIN_THRESHOLD_DB,
};

/// Cut silent stretches out of a video, re-encoding only what remains.
#[derive(Parser, Debug)]
#[command(name = "gapcut", version, about)]
pub struct CliArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output video file path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Silence threshold in dBFS; frames quieter than this count as silence
    #[arg(
        long,
        default_value_t = DEFAULT_THRESHOLD_DB,
        allow_negative_numbers = true,
        value_parser = threshold_in_range
    )]
    pub threshold_db: i32,

    /// Minimum silence duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_MIN_SILENCE_MS)]
    pub min_silence_ms: u64,

    /// Move the source to the output instead of copying when no silence is found
    #[arg(long)]
    pub move_source: bool,

    /// Skip hardware encoder probing and encode on the CPU
    #[arg(long)]
    pub software: bool,

    /// Number of segments to encode in parallel
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Root directory for per-run scratch space
    #[arg(long, env = "GAPCUT_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

/// Clap value parser keeping the threshold inside the accepted range.
fn threshold_in_range(s: &str) -> Result<i32, String> {
    let db: i32 = s
        .parse()
        .map_err(|_| format!("`{}` is not a whole number of dB", s))?;
    if (MIN_THRESHOLD_DB..=MAX_THRESHOLD_DB).contains(&db) {
        Ok(db)
    } else {
        Err(format!(
            "threshold must be between {} and {} dBFS",
            MIN_THRESHOLD_DB, MAX_THRESHOLD_DB
        ))
    }
}
