//! Silence-cut CLI binary.
//!
//! Drives the pipeline from argv, renders progress events as log lines
//! and maps the outcome to an exit code: 0 for full and partial success,
//! 1 for fatal errors.

use anyhow::{ensure, Context};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gapcut_media::{
    channel, DetectorConfig, FastPathMode, PipelineConfig, PipelineEvent, ProgressReceiver,
    SilenceCutPipeline,
};

mod args;

use args::CliArgs;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    ensure!(
        args.input != args.output,
        "input and output must be different paths"
    );

    let detector = DetectorConfig::default()
        .with_threshold_db(args.threshold_db)
        .with_min_silence_ms(args.min_silence_ms);

    let fast_path = if args.move_source {
        FastPathMode::Move
    } else {
        FastPathMode::Copy
    };

    let mut config = PipelineConfig::default()
        .with_detector(detector)
        .with_fast_path(fast_path)
        .with_max_parallel_encodes(args.jobs)
        .with_force_software(args.software);
    if let Some(dir) = args.work_dir {
        config = config.with_work_dir(dir);
    }

    let (sender, receiver) = channel();
    let events = spawn_event_logger(receiver);

    // First Ctrl-C flips the cancellation flag; running FFmpeg children
    // are killed once their wait finishes.
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = SilenceCutPipeline::new(config)
        .with_progress(sender)
        .with_cancel(cancel_rx);

    let run_result = pipeline.run(&args.input, &args.output).await;

    // Close the channel so the logger drains before the outcome is reported.
    drop(pipeline);
    events.await.ok();

    let result = run_result
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    if result.fast_path {
        info!(
            output = %result.output_path.display(),
            "Nothing to cut, source passed through in {:.1}s",
            result.elapsed_secs
        );
    } else {
        if result.is_partial() {
            warn!(
                failed = ?result.failed_segment_indices,
                "Output is missing {} segment(s) that failed both encoders",
                result.failed_segment_indices.len()
            );
        }
        info!(
            output = %result.output_path.display(),
            segments = result.succeeded_segments,
            "Done in {:.1}s",
            result.elapsed_secs
        );
    }

    Ok(())
}

/// Initialize tracing with colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("gapcut=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

/// Render pipeline events as log lines until the channel closes.
fn spawn_event_logger(mut receiver: ProgressReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            render_event(event);
        }
    })
}

fn render_event(event: PipelineEvent) {
    match event {
        PipelineEvent::ExtractingAudio => info!("Extracting audio track"),
        PipelineEvent::DetectingSilence { threshold_db } => {
            info!(threshold_db, "Scanning for silence")
        }
        PipelineEvent::SilenceDetected {
            silent_intervals,
            keep_intervals,
        } => info!(
            "Found {} silent stretch(es), keeping {} interval(s)",
            silent_intervals, keep_intervals
        ),
        PipelineEvent::NoSilenceFound => info!("No silence below threshold"),
        PipelineEvent::EncoderResolved { label, tier } => {
            info!(%tier, "Encoding with {}", label)
        }
        PipelineEvent::EncodingSegment {
            index,
            total,
            start_secs,
            duration_secs,
        } => info!(
            "Encoding segment {}/{} ({:.1}s, {:.1}s long)",
            index + 1,
            total,
            start_secs,
            duration_secs
        ),
        PipelineEvent::SegmentEncoded { index, tier } => {
            info!(%tier, "Segment {} encoded", index + 1)
        }
        PipelineEvent::SegmentFailed { index } => {
            warn!("Segment {} failed both encoders, dropping it", index + 1)
        }
        PipelineEvent::Concatenating { segments } => info!("Joining {} segment(s)", segments),
        PipelineEvent::Complete => info!("Run complete"),
        PipelineEvent::Failed { error } => error!("Run failed: {}", error),
    }
}
