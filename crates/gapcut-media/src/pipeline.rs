//! End-to-end silence cutting pipeline.
//!
//! Orchestrates probing, waveform extraction, silence detection, encoder
//! resolution, segment encoding and concatenation. The pipeline owns the
//! per-run scratch directory and removes it on every exit path.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use gapcut_models::{keep_intervals, EncoderProfile, Interval, PipelineResult, RunId};

use crate::concat::{concat_segments, ConcatError};
use crate::cutter::{cut_segments, CutReport, EncodeLimits};
use crate::detector::{detect_silence, DetectorConfig};
use crate::encoder::EncoderResolver;
use crate::error::MediaError;
use crate::fs_utils::{copy_file, move_file};
use crate::metrics;
use crate::probe::MediaSource;
use crate::progress::{noop_sender, ProgressSender};
use crate::waveform::{extract_waveform, ExtractionError};

/// Errors that abort a pipeline run.
///
/// Dropped segments are not an error; they surface through
/// `PipelineResult::failed_segment_indices`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Concat(#[from] ConcatError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Failed to prepare run directory: {0}")]
    WorkDir(#[from] std::io::Error),

    #[error("Run cancelled")]
    Cancelled,
}

/// What to do with the source when no silence is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastPathMode {
    /// Copy the source to the output path, leaving the source in place.
    #[default]
    Copy,
    /// Move the source to the output path.
    Move,
}

/// Tuning for pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Silence detector tuning.
    pub detector: DetectorConfig,
    /// Fast path behavior when no silence is found.
    pub fast_path: FastPathMode,
    /// Maximum concurrent segment encodes.
    pub max_parallel_encodes: usize,
    /// Per-FFmpeg-attempt timeout in seconds. `None` disables the timeout.
    pub encode_timeout_secs: Option<u64>,
    /// Root for per-run scratch directories. `None` uses the OS temp dir.
    pub work_dir: Option<PathBuf>,
    /// Skip hardware probing and encode with the software profile.
    pub force_software: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            fast_path: FastPathMode::Copy,
            max_parallel_encodes: 1,
            encode_timeout_secs: None,
            work_dir: None,
            force_software: false,
        }
    }
}

impl PipelineConfig {
    /// Builder-style setter for detector tuning.
    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    /// Builder-style setter for the fast path mode.
    pub fn with_fast_path(mut self, mode: FastPathMode) -> Self {
        self.fast_path = mode;
        self
    }

    /// Builder-style setter for encode parallelism, floored at one.
    pub fn with_max_parallel_encodes(mut self, n: usize) -> Self {
        self.max_parallel_encodes = n.max(1);
        self
    }

    /// Builder-style setter for the per-attempt timeout.
    pub fn with_encode_timeout_secs(mut self, secs: u64) -> Self {
        self.encode_timeout_secs = Some(secs);
        self
    }

    /// Builder-style setter for the scratch directory root.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Builder-style setter for forcing the software encoder.
    pub fn with_force_software(mut self, force: bool) -> Self {
        self.force_software = force;
        self
    }
}

/// Silence-driven re-encoding pipeline.
///
/// One instance can serve many runs; the encoder probe result is cached
/// across them.
pub struct SilenceCutPipeline {
    config: PipelineConfig,
    resolver: EncoderResolver,
    progress: ProgressSender,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl SilenceCutPipeline {
    /// Pipeline with the given config and no progress reporting.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            resolver: EncoderResolver::new(),
            progress: noop_sender(),
            cancel_rx: None,
        }
    }

    /// Attach a progress sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Replace the encoder resolver, e.g. to inject a capability probe.
    pub fn with_resolver(mut self, resolver: EncoderResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Detect silence in `input` and materialize the cut video (or the
    /// unchanged source, when nothing qualifies) at `output`.
    ///
    /// Exactly one terminal progress event is emitted per run. Segments
    /// dropped after both encode tiers failed do not abort the run; they
    /// are listed in the result.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<PipelineResult, PipelineError> {
        let result = self.run_inner(input.as_ref(), output.as_ref()).await;

        match &result {
            Ok(outcome) => {
                self.progress.complete();
                metrics::record_run_completed(outcome.fast_path, outcome.elapsed_secs);
            }
            Err(e) => {
                self.progress.failed(e.to_string());
                metrics::record_run_failed();
            }
        }

        result
    }

    async fn run_inner(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<PipelineResult, PipelineError> {
        let run_id = RunId::new();
        let started = Instant::now();
        let started_at = Utc::now();

        info!(
            run_id = %run_id,
            input = %input.display(),
            output = %output.display(),
            threshold_db = self.config.detector.threshold_db,
            "Starting run"
        );
        self.check_cancelled()?;

        let source = MediaSource::open(input).await?;
        let duration = source.duration_secs();

        self.progress.extracting_audio();
        let waveform = extract_waveform(&source).await?;

        self.progress.detecting_silence(self.config.detector.threshold_db);
        let samples = waveform.load_samples().await?;
        let silences = detect_silence(&samples, waveform.sample_rate(), &self.config.detector);
        // The PCM scratch file is not needed once detection ran.
        drop(samples);
        drop(waveform);

        if silences.is_empty() {
            self.progress.no_silence_found();
            info!(run_id = %run_id, "No silence below threshold, passing source through");
            self.pass_through(input, output).await?;

            return Ok(PipelineResult {
                run_id,
                output_path: output.to_path_buf(),
                succeeded_segments: 0,
                failed_segment_indices: Vec::new(),
                fast_path: true,
                started_at,
                elapsed_secs: started.elapsed().as_secs_f64(),
            });
        }

        let keeps = keep_intervals(&silences, duration);
        self.progress.silence_detected(silences.len(), keeps.len());
        info!(
            run_id = %run_id,
            silences = silences.len(),
            keeps = keeps.len(),
            "Silence scan finished"
        );
        self.check_cancelled()?;

        let run_dir = self.create_run_dir(&run_id).await?;
        let result = self
            .encode_and_join(&source, &keeps, run_dir.path(), output)
            .await;
        cleanup_run_dir(run_dir);

        let report = result?;
        if !report.failed_indices.is_empty() {
            warn!(
                run_id = %run_id,
                failed = ?report.failed_indices,
                "Output is missing segments that failed both tiers"
            );
        }

        Ok(PipelineResult {
            run_id,
            output_path: output.to_path_buf(),
            succeeded_segments: report.segments.len(),
            failed_segment_indices: report.failed_indices,
            fast_path: false,
            started_at,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Materialize the source at the output path without re-encoding.
    async fn pass_through(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        match self.config.fast_path {
            FastPathMode::Copy => copy_file(input, output).await?,
            FastPathMode::Move => move_file(input, output).await?,
        }
        Ok(())
    }

    /// Resolve the encoder, cut all keep intervals and join the parts.
    async fn encode_and_join(
        &self,
        source: &MediaSource,
        keeps: &[Interval],
        run_dir: &Path,
        output: &Path,
    ) -> Result<CutReport, PipelineError> {
        let profile = if self.config.force_software {
            EncoderProfile::software()
        } else {
            self.resolver.resolve().await
        };
        self.progress
            .encoder_resolved(profile.label.clone(), profile.tier);

        let limits = EncodeLimits {
            max_parallel: self.config.max_parallel_encodes,
            timeout_secs: self.config.encode_timeout_secs,
        };

        let report = match cut_segments(
            source,
            keeps,
            &profile,
            run_dir,
            &limits,
            self.cancel_rx.clone(),
            &self.progress,
        )
        .await
        {
            Ok(report) => report,
            Err(MediaError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        self.check_cancelled()?;

        match concat_segments(
            &report.segments,
            &profile,
            run_dir,
            output,
            self.config.encode_timeout_secs,
            self.cancel_rx.clone(),
            &self.progress,
        )
        .await
        {
            Ok(_) => Ok(report),
            Err(ConcatError::Media(MediaError::Cancelled)) => Err(PipelineError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the per-run scratch directory, named by run id so
    /// concurrent runs cannot collide.
    async fn create_run_dir(&self, run_id: &RunId) -> Result<TempDir, PipelineError> {
        let prefix = format!("gapcut-{}-", run_id);

        let dir = match &self.config.work_dir {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir()?,
        };

        info!(run_dir = %dir.path().display(), "Created run directory");
        Ok(dir)
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if let Some(rx) = &self.cancel_rx {
            if *rx.borrow() {
                return Err(PipelineError::Cancelled);
            }
        }
        Ok(())
    }
}

/// Remove the run directory, logging failures without escalating.
fn cleanup_run_dir(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove run directory"
        );
    }
}
