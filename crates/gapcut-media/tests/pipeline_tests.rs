//! Pipeline integration tests.
//!
//! Everything here runs without an ffmpeg binary: encode behavior is
//! exercised through the fallback combinator and encoder discovery goes
//! through fake capability probes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gapcut_media::{
    build_manifest, channel, detect_silence, encode_with_fallback, CapabilityProbe,
    DetectorConfig, EncoderResolver, MediaError, MediaResult, PipelineConfig, PipelineError,
    PipelineEvent, SilenceCutPipeline,
};
use gapcut_models::{keep_intervals, EncoderProfile, EncoderTier, Interval, Segment};

const RATE: u32 = 1_000;

fn tone(secs: f64) -> Vec<f32> {
    vec![0.5; (secs * RATE as f64) as usize]
}

fn near_silence(secs: f64) -> Vec<f32> {
    vec![0.0001; (secs * RATE as f64) as usize]
}

/// Full detection chain: synthetic speech with one long pause becomes
/// one silent interval and two keep intervals around it.
#[test]
fn test_detection_to_keep_intervals() {
    let mut samples = tone(2.0);
    samples.extend(near_silence(1.5));
    samples.extend(tone(2.0));

    let config = DetectorConfig::default();
    let silences = detect_silence(&samples, RATE, &config);
    assert_eq!(silences.len(), 1);

    let duration = samples.len() as f64 / RATE as f64;
    let keeps = keep_intervals(&silences, duration);
    assert_eq!(keeps.len(), 2);
    assert!(keeps[0].start_secs.abs() < 1e-9);
    assert!((keeps[1].end_secs - duration).abs() < 1e-9);

    // Kept and cut time account for the whole source.
    let kept: f64 = keeps.iter().map(|k| k.duration_secs()).sum();
    let cut: f64 = silences.iter().map(|s| s.duration_secs()).sum();
    assert!((kept + cut - duration).abs() < 0.05);
}

/// Keep intervals are the exact ordered complement of the silences.
#[test]
fn test_keep_interval_complement() {
    let silences = vec![
        Interval::new(5.0, 6.0).unwrap(),
        Interval::new(20.0, 22.5).unwrap(),
    ];
    let keeps = keep_intervals(&silences, 30.0);

    let expected = [(0.0, 5.0), (6.0, 20.0), (22.5, 30.0)];
    assert_eq!(keeps.len(), expected.len());
    for (keep, (start, end)) in keeps.iter().zip(expected) {
        assert!((keep.start_secs - start).abs() < 1e-9);
        assert!((keep.end_secs - end).abs() < 1e-9);
    }
}

struct FixedProbe(Vec<&'static str>);

#[async_trait]
impl CapabilityProbe for FixedProbe {
    async fn available_encoders(&self) -> MediaResult<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

/// NVENC wins when every hardware encoder is present.
#[tokio::test]
async fn test_resolver_prefers_nvenc() {
    let resolver = EncoderResolver::with_probe(Box::new(FixedProbe(vec![
        "h264_qsv",
        "h264_amf",
        "h264_nvenc",
    ])));

    let profile = resolver.resolve().await;
    assert_eq!(profile.video_codec, "h264_nvenc");
    assert_eq!(profile.tier, EncoderTier::Hardware);
}

/// A machine without hardware encoders resolves to libx264, never an error.
#[tokio::test]
async fn test_resolver_falls_back_to_software() {
    let resolver = EncoderResolver::with_probe(Box::new(FixedProbe(vec![])));

    let profile = resolver.resolve().await;
    assert!(profile.is_software());
    assert_eq!(profile.video_codec, "libx264");
}

/// Hardware failure falls back to software exactly once and the result
/// reports the tier that actually produced the output.
#[tokio::test]
async fn test_fallback_recovers_with_software() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&attempts);

    let hardware = EncoderProfile::for_video_codec("h264_nvenc");
    let tier = encode_with_fallback(&hardware, move |profile| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(profile.video_codec.clone());
            if profile.is_software() {
                Ok(())
            } else {
                Err(MediaError::ffmpeg_failed(
                    "hardware rejected the stream",
                    None,
                    Some(1),
                ))
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(tier, EncoderTier::Software);
    assert_eq!(
        attempts.lock().unwrap().as_slice(),
        ["h264_nvenc", "libx264"]
    );
}

/// Cancellation aborts immediately instead of burning a software retry.
#[tokio::test]
async fn test_fallback_never_retries_cancellation() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    let hardware = EncoderProfile::for_video_codec("h264_nvenc");
    let result = encode_with_fallback(&hardware, move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MediaError::Cancelled)
        }
    })
    .await;

    assert!(matches!(result, Err(MediaError::Cancelled)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

/// Manifest lines follow the concat demuxer quoting rules.
#[test]
fn test_manifest_quoting() {
    let segments = vec![
        Segment {
            index: 0,
            source: Interval::new(0.0, 1.0).unwrap(),
            path: "/scratch/run/part_0000.mp4".into(),
            tier: EncoderTier::Hardware,
        },
        Segment {
            index: 1,
            source: Interval::new(2.0, 3.0).unwrap(),
            path: "/scratch/it's run/part_0001.mp4".into(),
            tier: EncoderTier::Software,
        },
    ];

    let manifest = build_manifest(&segments);
    let mut lines = manifest.lines();
    assert_eq!(lines.next(), Some("file '/scratch/run/part_0000.mp4'"));
    assert_eq!(
        lines.next(),
        Some("file '/scratch/it'\\''s run/part_0001.mp4'")
    );
    assert_eq!(lines.next(), None);
}

/// A missing source surfaces as a typed error, the only terminal event
/// is Failed, and no scratch space is left behind.
#[tokio::test]
async fn test_pipeline_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch");
    let (sender, mut receiver) = channel();

    let config = PipelineConfig::default().with_work_dir(&scratch);
    let pipeline = SilenceCutPipeline::new(config).with_progress(sender);

    let result = pipeline
        .run(dir.path().join("missing.mp4"), dir.path().join("out.mp4"))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Media(MediaError::FileNotFound(_)))
    ));

    let mut saw_failed = false;
    while let Some(event) = receiver.try_recv() {
        match event {
            PipelineEvent::Failed { .. } => saw_failed = true,
            PipelineEvent::Complete => panic!("Complete emitted after a failed run"),
            _ => {}
        }
    }
    assert!(saw_failed);
    assert!(!scratch.exists());
}

/// A cancellation raised before the run starts unwinds without touching
/// the source.
#[tokio::test]
async fn test_pipeline_pre_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.mp4");
    tokio::fs::write(&input, b"container bytes").await.unwrap();

    let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(true);
    let pipeline = SilenceCutPipeline::new(PipelineConfig::default()).with_cancel(cancel_rx);

    let result = pipeline.run(&input, dir.path().join("out.mp4")).await;
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(input.exists());
}
