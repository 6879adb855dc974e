//! Segment cutting with per-attempt encoder fallback.
//!
//! Each keep interval is encoded to its own file inside the run's temp
//! directory. A hardware attempt that fails gets exactly one software
//! retry; a segment that fails both tiers is recorded and the remaining
//! segments still encode, so one bad stretch of source never sinks the
//! whole run.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use gapcut_models::{EncoderProfile, EncoderTier, Interval, Segment, MIN_SPAN_SECS};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::probe::MediaSource;
use crate::progress::ProgressSender;

/// Seconds of pre-roll for the fast input seek; the accurate output seek
/// decodes the remainder from the preceding keyframe.
const FAST_SEEK_PREROLL_SECS: f64 = 5.0;

/// Video filter applied to every segment: encoders reject odd
/// dimensions, and a uniform pixel format keeps the concat demuxer happy.
const SEGMENT_VIDEO_FILTER: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p";

/// Resource limits for segment encoding.
#[derive(Debug, Clone)]
pub struct EncodeLimits {
    /// Maximum concurrent segment encodes. FFmpeg multithreads
    /// internally, so 1 is usually right.
    pub max_parallel: usize,
    /// Per-attempt timeout in seconds; `None` means no timeout.
    pub timeout_secs: Option<u64>,
}

impl Default for EncodeLimits {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            timeout_secs: None,
        }
    }
}

/// Report from cutting all keep intervals.
#[derive(Debug)]
pub struct CutReport {
    /// Encoded segments in ascending index order
    pub segments: Vec<Segment>,
    /// Keep-interval indices that failed both tiers, ascending
    pub failed_indices: Vec<usize>,
}

/// Run the primary encode attempt for `profile`; when it fails and the
/// profile is not already software, retry exactly once with the software
/// profile.
///
/// Returns the tier that produced the output. Cancellation is never
/// retried.
pub async fn encode_with_fallback<F, Fut>(
    profile: &EncoderProfile,
    mut attempt: F,
) -> MediaResult<EncoderTier>
where
    F: FnMut(EncoderProfile) -> Fut,
    Fut: Future<Output = MediaResult<()>>,
{
    match attempt(profile.clone()).await {
        Ok(()) => Ok(profile.tier),
        Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
        Err(primary_err) if !profile.is_software() => {
            warn!(
                codec = %profile.video_codec,
                error = %primary_err,
                "Hardware encode failed, retrying with software"
            );
            metrics::record_encoder_fallback();
            attempt(EncoderProfile::software())
                .await
                .map(|()| EncoderTier::Software)
        }
        Err(e) => Err(e),
    }
}

/// Outcome of one keep interval.
enum Outcome {
    Encoded(Segment),
    Failed(usize),
    Cancelled,
}

/// Encode every keep interval into the run directory.
///
/// Segments may encode concurrently up to `limits.max_parallel`; results
/// are merged after the join in keep-interval order, so completion order
/// never affects the output order. The cancellation flag is checked
/// before each segment starts.
#[allow(clippy::too_many_arguments)]
pub async fn cut_segments(
    source: &MediaSource,
    keeps: &[Interval],
    profile: &EncoderProfile,
    run_dir: &Path,
    limits: &EncodeLimits,
    cancel_rx: Option<watch::Receiver<bool>>,
    progress: &ProgressSender,
) -> MediaResult<CutReport> {
    let total = keeps.len();
    let semaphore = Arc::new(Semaphore::new(limits.max_parallel.max(1)));

    let futures = keeps.iter().enumerate().filter_map(|(index, keep)| {
        if keep.duration_secs() <= MIN_SPAN_SECS {
            debug!(index, interval = %keep, "Skipping empty keep interval");
            return None;
        }

        let semaphore = Arc::clone(&semaphore);
        let cancel_rx = cancel_rx.clone();
        let seg_path = run_dir.join(Segment::file_name(index));

        Some(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Outcome::Failed(index),
            };

            if let Some(ref rx) = cancel_rx {
                if *rx.borrow() {
                    return Outcome::Cancelled;
                }
            }

            progress.encoding_segment(index, total, keep.start_secs, keep.duration_secs());

            let result = encode_with_fallback(profile, |attempt_profile| {
                let cancel_rx = cancel_rx.clone();
                let seg_path = seg_path.clone();
                async move {
                    encode_segment_attempt(
                        source.path(),
                        keep,
                        &attempt_profile,
                        &seg_path,
                        cancel_rx,
                        limits.timeout_secs,
                        index,
                    )
                    .await
                }
            })
            .await;

            match result {
                Ok(tier) => {
                    progress.segment_encoded(index, tier);
                    metrics::record_segment_encoded(tier.as_str());
                    Outcome::Encoded(Segment {
                        index,
                        source: *keep,
                        path: seg_path,
                        tier,
                    })
                }
                Err(MediaError::Cancelled) => Outcome::Cancelled,
                Err(e) => {
                    warn!(
                        index,
                        interval = %keep,
                        error = %e,
                        "Segment failed both tiers, dropping"
                    );
                    progress.segment_failed(index);
                    metrics::record_segment_dropped();
                    // A half-written file must not reach the concatenator.
                    let _ = tokio::fs::remove_file(&seg_path).await;
                    Outcome::Failed(index)
                }
            }
        })
    });

    let outcomes = join_all(futures).await;

    let mut segments = Vec::with_capacity(outcomes.len());
    let mut failed_indices = Vec::new();
    let mut cancelled = false;
    for outcome in outcomes {
        match outcome {
            Outcome::Encoded(segment) => segments.push(segment),
            Outcome::Failed(index) => failed_indices.push(index),
            Outcome::Cancelled => cancelled = true,
        }
    }

    if cancelled {
        return Err(MediaError::Cancelled);
    }

    Ok(CutReport {
        segments,
        failed_indices,
    })
}

/// One encode attempt for one keep interval with one profile.
#[allow(clippy::too_many_arguments)]
async fn encode_segment_attempt(
    source_path: &Path,
    keep: &Interval,
    profile: &EncoderProfile,
    seg_path: &Path,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
    index: usize,
) -> MediaResult<()> {
    let start = keep.start_secs;
    // Two-pass seeking: jump near the target on keyframes, then decode
    // precisely to it. Input seeking alone snaps to keyframes and
    // duplicates frames at segment joints.
    let fast_seek = if start > FAST_SEEK_PREROLL_SECS {
        start - FAST_SEEK_PREROLL_SECS
    } else {
        0.0
    };
    let accurate_seek = start - fast_seek;

    let cmd = FfmpegCommand::new(source_path, seg_path)
        .seek(fast_seek)
        .output_seek(accurate_seek)
        .duration(keep.duration_secs())
        .video_filter(SEGMENT_VIDEO_FILTER)
        .output_args(profile.quality_args())
        // Re-base timestamps so every segment starts at zero.
        .output_args(["-avoid_negative_ts", "make_zero"]);

    let mut runner = FfmpegRunner::new();
    if let Some(rx) = cancel_rx {
        runner = runner.with_cancel(rx);
    }
    if let Some(secs) = timeout_secs {
        runner = runner.with_timeout(secs);
    }

    let total_ms = (keep.duration_secs() * 1000.0) as i64;
    runner
        .run_with_progress(&cmd, move |p| {
            debug!(
                segment = index,
                percent = format!("{:.0}", p.percentage(total_ms)),
                speed = p.speed,
                eta_secs = ?p.eta_seconds(total_ms),
                "Segment encode progress"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn hw_profile() -> EncoderProfile {
        EncoderProfile::for_video_codec("h264_nvenc")
    }

    fn encode_error(msg: &str) -> MediaError {
        MediaError::ffmpeg_failed(msg, None, Some(1))
    }

    #[tokio::test]
    async fn test_fallback_primary_succeeds() {
        let attempts = AtomicUsize::new(0);
        let tier = encode_with_fallback(&hw_profile(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(tier, EncoderTier::Hardware);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_hardware_fails_software_succeeds() {
        let tried: Mutex<Vec<EncoderTier>> = Mutex::new(Vec::new());
        let tier = encode_with_fallback(&hw_profile(), |profile| {
            tried.lock().unwrap().push(profile.tier);
            async move {
                match profile.tier {
                    EncoderTier::Hardware => Err(encode_error("nvenc rejected input")),
                    EncoderTier::Software => Ok(()),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(tier, EncoderTier::Software);
        assert_eq!(
            *tried.lock().unwrap(),
            vec![EncoderTier::Hardware, EncoderTier::Software]
        );
    }

    #[tokio::test]
    async fn test_fallback_both_tiers_fail() {
        let attempts = AtomicUsize::new(0);
        let result = encode_with_fallback(&hw_profile(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(encode_error("boom")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_software_profile_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result = encode_with_fallback(&EncoderProfile::software(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(encode_error("x264 failed")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_cancellation_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result = encode_with_fallback(&hw_profile(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(MediaError::Cancelled) }
        })
        .await;

        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_limits_default() {
        let limits = EncodeLimits::default();
        assert_eq!(limits.max_parallel, 1);
        assert!(limits.timeout_secs.is_none());
    }

    fn fake_source() -> MediaSource {
        MediaSource::with_info(
            "/video/source.mp4",
            crate::probe::SourceInfo {
                duration_secs: 30.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                video_codec: "h264".to_string(),
                has_audio: true,
                size_bytes: 1024,
            },
        )
    }

    #[tokio::test]
    async fn test_cut_segments_skips_empty_intervals() {
        let dir = tempfile::tempdir().unwrap();
        let keeps = vec![
            Interval::new(1.0, 1.0005).unwrap(),
            Interval::new(2.0, 2.0001).unwrap(),
        ];

        // Every interval is at or below the minimum span, so no FFmpeg
        // process is ever spawned.
        let report = cut_segments(
            &fake_source(),
            &keeps,
            &hw_profile(),
            dir.path(),
            &EncodeLimits::default(),
            None,
            &crate::progress::noop_sender(),
        )
        .await
        .unwrap();

        assert!(report.segments.is_empty());
        assert!(report.failed_indices.is_empty());
    }

    #[tokio::test]
    async fn test_cut_segments_pre_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let keeps = vec![Interval::new(0.0, 5.0).unwrap()];

        let (_tx, rx) = watch::channel(true);
        let result = cut_segments(
            &fake_source(),
            &keeps,
            &hw_profile(),
            dir.path(),
            &EncodeLimits::default(),
            Some(rx),
            &crate::progress::noop_sender(),
        )
        .await;

        assert!(matches!(result, Err(MediaError::Cancelled)));
    }
}
