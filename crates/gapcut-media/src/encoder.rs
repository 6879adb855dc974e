//! Hardware encoder resolution.
//!
//! Walks a fixed priority list (NVENC, then AMF, then QSV) against the
//! encoders this host's FFmpeg build offers and falls back to software
//! when none match. Resolution never fails; the software profile is
//! always usable.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use gapcut_models::{EncoderProfile, HARDWARE_CODEC_PRIORITY};

use crate::error::{MediaError, MediaResult};

/// Source of the encoder names available on this host.
///
/// The production implementation shells out to FFmpeg; tests substitute
/// fixed lists to exercise the priority order without a GPU.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Names of the available encoders relevant to resolution.
    async fn available_encoders(&self) -> MediaResult<Vec<String>>;
}

/// Probe backed by `ffmpeg -hide_banner -encoders`.
#[derive(Debug, Default)]
pub struct FfmpegCapabilityProbe;

#[async_trait]
impl CapabilityProbe for FfmpegCapabilityProbe {
    async fn available_encoders(&self) -> MediaResult<Vec<String>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await?;

        // The encoder table prints even when the exit code is odd, so
        // scan whatever came back for the names we can use.
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(HARDWARE_CODEC_PRIORITY
            .iter()
            .filter(|codec| stdout.contains(*(*codec)))
            .map(|codec| codec.to_string())
            .collect())
    }
}

/// Resolves the best encoder profile for this host, probing at most once.
pub struct EncoderResolver {
    probe: Box<dyn CapabilityProbe>,
    cached: OnceCell<EncoderProfile>,
}

impl Default for EncoderResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderResolver {
    /// Resolver backed by the FFmpeg probe.
    pub fn new() -> Self {
        Self::with_probe(Box::new(FfmpegCapabilityProbe))
    }

    /// Resolver with a custom probe.
    pub fn with_probe(probe: Box<dyn CapabilityProbe>) -> Self {
        Self {
            probe,
            cached: OnceCell::new(),
        }
    }

    /// Resolve the encoder profile. The first call probes; later calls
    /// return the cached result.
    pub async fn resolve(&self) -> EncoderProfile {
        self.cached
            .get_or_init(|| async { self.resolve_uncached().await })
            .await
            .clone()
    }

    async fn resolve_uncached(&self) -> EncoderProfile {
        let available = match self.probe.available_encoders().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Encoder probe failed, falling back to software");
                return EncoderProfile::software();
            }
        };

        for codec in HARDWARE_CODEC_PRIORITY {
            if available.iter().any(|a| a == codec) {
                let profile = EncoderProfile::for_video_codec(codec);
                info!(
                    codec = %profile.video_codec,
                    label = %profile.label,
                    "Hardware encoder selected"
                );
                return profile;
            }
        }

        debug!("No hardware encoder available, using software");
        EncoderProfile::software()
    }
}
