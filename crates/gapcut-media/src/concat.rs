//! Joining encoded segments with FFmpeg's concat demuxer.
//!
//! Segments arrive as independent files in the run directory; the
//! demuxer reads them from a manifest listing one `file` directive per
//! part, in keep-interval order.

use std::path::Path;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gapcut_models::{EncoderProfile, EncoderTier, Segment};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::cutter::encode_with_fallback;
use crate::error::{MediaError, MediaResult};
use crate::progress::ProgressSender;

/// Manifest file name inside the run directory.
pub const MANIFEST_FILE_NAME: &str = "concat_manifest.txt";

/// Errors from segment concatenation.
#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("No valid segments to concatenate")]
    NoValidSegments,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Failed to write concat manifest: {0}")]
    Io(#[from] std::io::Error),
}

/// Join segments into `output`, re-encoding with `profile` and falling
/// back to software once if the hardware pass fails.
///
/// Segments whose file is missing or empty are skipped; if none remain
/// the function returns [`ConcatError::NoValidSegments`] without
/// touching FFmpeg. The manifest is removed after the attempt whether
/// it succeeded or not. Returns the tier that produced the output.
pub async fn concat_segments(
    segments: &[Segment],
    profile: &EncoderProfile,
    run_dir: &Path,
    output: &Path,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
    progress: &ProgressSender,
) -> Result<EncoderTier, ConcatError> {
    let valid = validate_segments(segments).await;
    if valid.is_empty() {
        return Err(ConcatError::NoValidSegments);
    }
    if valid.len() < segments.len() {
        warn!(
            encoded = segments.len(),
            usable = valid.len(),
            "Some segment files are unusable, concatenating the rest"
        );
    }

    progress.concatenating(valid.len());

    let manifest_path = run_dir.join(MANIFEST_FILE_NAME);
    tokio::fs::write(&manifest_path, build_manifest(&valid)).await?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let result = encode_with_fallback(profile, |attempt_profile| {
        let cancel_rx = cancel_rx.clone();
        let manifest_path = manifest_path.clone();
        async move {
            run_concat(
                &manifest_path,
                &attempt_profile,
                output,
                cancel_rx,
                timeout_secs,
            )
            .await
        }
    })
    .await;

    if let Err(e) = tokio::fs::remove_file(&manifest_path).await {
        warn!(
            path = %manifest_path.display(),
            error = %e,
            "Failed to remove concat manifest"
        );
    }

    let tier = result?;
    info!(
        segments = valid.len(),
        tier = %tier,
        output = %output.display(),
        "Concatenation complete"
    );
    Ok(tier)
}

/// One concat attempt with one profile.
async fn run_concat(
    manifest: &Path,
    profile: &EncoderProfile,
    output: &Path,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
) -> MediaResult<()> {
    let command = FfmpegCommand::new(manifest, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .output_args(profile.quality_args())
        .output_args(["-movflags", "+faststart"]);

    let mut runner = FfmpegRunner::new();
    if let Some(rx) = cancel_rx {
        runner = runner.with_cancel(rx);
    }
    if let Some(secs) = timeout_secs {
        runner = runner.with_timeout(secs);
    }

    debug!(
        encoder = %profile.label,
        output = %output.display(),
        "Joining segments"
    );
    runner.run(&command).await
}

/// Render the manifest body, one `file` directive per segment.
pub fn build_manifest(segments: &[Segment]) -> String {
    let mut manifest = String::new();
    for segment in segments {
        manifest.push_str("file '");
        manifest.push_str(&escape_manifest_path(&segment.path));
        manifest.push_str("'\n");
    }
    manifest
}

/// Escape a path for a single-quoted `file` directive. An embedded
/// quote closes the string, emits an escaped quote and reopens it.
fn escape_manifest_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Drop segments whose file is missing or empty, restoring index order.
async fn validate_segments(segments: &[Segment]) -> Vec<Segment> {
    let mut valid = Vec::with_capacity(segments.len());
    for segment in segments {
        match tokio::fs::metadata(&segment.path).await {
            Ok(meta) if meta.len() > 0 => valid.push(segment.clone()),
            Ok(_) => warn!(
                index = segment.index,
                path = %segment.path.display(),
                "Segment file is empty, skipping"
            ),
            Err(e) => warn!(
                index = segment.index,
                path = %segment.path.display(),
                error = %e,
                "Segment file is unreadable, skipping"
            ),
        }
    }
    valid.sort_by_key(|s| s.index);
    valid
}
