//! Waveform extraction for silence analysis.
//!
//! Demuxes and decodes the source's audio track to raw mono f32 PCM in a
//! temporary file. The handle owns that file; dropping the handle releases
//! it, so the waveform never outlives the analysis that needed it.

use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaError;
use crate::probe::MediaSource;

/// Sample rate for silence analysis.
pub const WAVEFORM_SAMPLE_RATE: u32 = 44_100;

/// Errors from waveform extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Source has no audio stream")]
    NoAudioStream,

    #[error("Extracted waveform is empty")]
    EmptyWaveform,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Failed to read waveform: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracted waveform backed by a temporary PCM file.
pub struct WaveformHandle {
    path: TempPath,
    sample_rate: u32,
    sample_count: usize,
}

impl WaveformHandle {
    /// Sample rate of the stored PCM data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples in the waveform.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Waveform duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate as f64
    }

    /// Load the samples into memory. Loading is idempotent; the backing
    /// file is read-only once extraction finished.
    pub async fn load_samples(&self) -> Result<Vec<f32>, ExtractionError> {
        load_samples_from(&self.path).await
    }
}

/// Extract the audio track of `source` to mono f32le PCM.
///
/// Fails fast with [`ExtractionError::NoAudioStream`] when the probe saw
/// no audio stream, before any FFmpeg invocation.
pub async fn extract_waveform(source: &MediaSource) -> Result<WaveformHandle, ExtractionError> {
    if !source.info().has_audio {
        return Err(ExtractionError::NoAudioStream);
    }

    let temp = NamedTempFile::new()?;
    let temp_path = temp.into_temp_path();

    debug!(
        input = %source.path().display(),
        output = %temp_path.display(),
        sample_rate = WAVEFORM_SAMPLE_RATE,
        "Extracting waveform"
    );

    let cmd = FfmpegCommand::new(source.path(), &temp_path).output_args([
        "-vn",
        "-ac",
        "1",
        "-ar",
        &WAVEFORM_SAMPLE_RATE.to_string(),
        "-f",
        "f32le",
    ]);
    FfmpegRunner::new().run(&cmd).await?;

    let metadata = tokio::fs::metadata(&temp_path).await?;
    if metadata.len() == 0 {
        return Err(ExtractionError::EmptyWaveform);
    }
    let sample_count = (metadata.len() / 4) as usize;

    debug!(
        bytes = metadata.len(),
        samples = sample_count,
        "Waveform extraction complete"
    );

    Ok(WaveformHandle {
        path: temp_path,
        sample_rate: WAVEFORM_SAMPLE_RATE,
        sample_count,
    })
}

/// Load raw f32le samples from a file.
async fn load_samples_from(path: &std::path::Path) -> Result<Vec<f32>, ExtractionError> {
    let bytes = tokio::fs::read(path).await?;

    // 4 bytes per sample, little-endian
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(samples)
}
