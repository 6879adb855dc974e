//! Encoder tiers and quality profiles.
//!
//! A profile pairs an FFmpeg codec name with the tier it belongs to and a
//! vendor display label. The label is presentation-only; everything in the
//! pipeline branches on [`EncoderTier`].

use serde::{Deserialize, Serialize};

/// Software H.264 encoder, always available.
pub const SOFTWARE_VIDEO_CODEC: &str = "libx264";
/// NVIDIA NVENC H.264 encoder.
pub const NVENC_VIDEO_CODEC: &str = "h264_nvenc";
/// AMD AMF H.264 encoder.
pub const AMF_VIDEO_CODEC: &str = "h264_amf";
/// Intel Quick Sync H.264 encoder.
pub const QSV_VIDEO_CODEC: &str = "h264_qsv";

/// Hardware codecs in resolution priority order.
pub const HARDWARE_CODEC_PRIORITY: &[&str] =
    &[NVENC_VIDEO_CODEC, AMF_VIDEO_CODEC, QSV_VIDEO_CODEC];

/// Audio codec used by every profile
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Encoding preset shared by both tiers
pub const DEFAULT_PRESET: &str = "slow";
/// Quantization target for hardware encodes
pub const HARDWARE_CQ: u8 = 19;
/// Constant Rate Factor for software encodes
pub const SOFTWARE_CRF: u8 = 16;
/// Encoder thread cap, keeps one encode from saturating the host
pub const ENCODER_THREADS: u8 = 2;

/// Encoder tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderTier {
    /// GPU-accelerated encoder (NVENC, AMF or QSV)
    Hardware,
    /// CPU encoder (libx264), the universal fallback
    Software,
}

impl EncoderTier {
    /// Returns the tier name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderTier::Hardware => "hardware",
            EncoderTier::Software => "software",
        }
    }
}

impl std::fmt::Display for EncoderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved encoder selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderProfile {
    /// FFmpeg video codec name (e.g. "h264_nvenc", "libx264")
    pub video_codec: String,
    /// FFmpeg audio codec name
    pub audio_codec: String,
    /// Vendor display label (e.g. "NVIDIA NVENC H.264"), presentation-only
    pub label: String,
    /// Tier the codec belongs to
    pub tier: EncoderTier,
}

impl EncoderProfile {
    /// The guaranteed software fallback profile (libx264/aac).
    pub fn software() -> Self {
        Self {
            video_codec: SOFTWARE_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            label: "CPU (libx264)".to_string(),
            tier: EncoderTier::Software,
        }
    }

    /// Profile for a probed video codec name. Unknown codecs map to the
    /// software profile so resolution can never produce an unusable result.
    pub fn for_video_codec(codec: &str) -> Self {
        let (label, tier) = match codec {
            NVENC_VIDEO_CODEC => ("NVIDIA NVENC H.264", EncoderTier::Hardware),
            AMF_VIDEO_CODEC => ("AMD AMF H.264", EncoderTier::Hardware),
            QSV_VIDEO_CODEC => ("Intel Quick Sync Video", EncoderTier::Hardware),
            _ => return Self::software(),
        };
        Self {
            video_codec: codec.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            label: label.to_string(),
            tier,
        }
    }

    /// Whether this profile already is the software fallback.
    pub fn is_software(&self) -> bool {
        self.tier == EncoderTier::Software
    }

    /// Render the fixed quality settings as FFmpeg output arguments.
    pub fn quality_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.video_codec.clone()];

        match self.tier {
            EncoderTier::Hardware => {
                // Hardware encoders take a rate-control mode plus a
                // quantization target; the bitrate bounds stop VBR spikes.
                args.extend_from_slice(&[
                    "-rc".to_string(),
                    "vbr_hq".to_string(),
                    "-cq".to_string(),
                    HARDWARE_CQ.to_string(),
                    "-preset".to_string(),
                    DEFAULT_PRESET.to_string(),
                    "-bf".to_string(),
                    "2".to_string(),
                    "-g".to_string(),
                    "60".to_string(),
                    "-maxrate".to_string(),
                    "50M".to_string(),
                    "-bufsize".to_string(),
                    "25M".to_string(),
                ]);
            }
            EncoderTier::Software => {
                args.extend_from_slice(&[
                    "-preset".to_string(),
                    DEFAULT_PRESET.to_string(),
                    "-crf".to_string(),
                    SOFTWARE_CRF.to_string(),
                    "-bf".to_string(),
                    "2".to_string(),
                    "-g".to_string(),
                    "60".to_string(),
                ]);
            }
        }

        args.extend_from_slice(&[
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-threads".to_string(),
            ENCODER_THREADS.to_string(),
        ]);

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_profile() {
        let profile = EncoderProfile::software();
        assert_eq!(profile.video_codec, "libx264");
        assert_eq!(profile.audio_codec, "aac");
        assert_eq!(profile.tier, EncoderTier::Software);
        assert!(profile.is_software());
    }

    #[test]
    fn test_software_quality_args() {
        let args = EncoderProfile::software().quality_args();
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"16".to_string()));
        assert!(args.contains(&"-preset".to_string()));
        assert!(!args.contains(&"-cq".to_string()));
        assert!(!args.contains(&"-maxrate".to_string()));
    }

    #[test]
    fn test_hardware_quality_args() {
        let profile = EncoderProfile::for_video_codec(NVENC_VIDEO_CODEC);
        assert_eq!(profile.tier, EncoderTier::Hardware);
        let args = profile.quality_args();
        assert!(args.contains(&"h264_nvenc".to_string()));
        assert!(args.contains(&"-cq".to_string()));
        assert!(args.contains(&"19".to_string()));
        assert!(args.contains(&"-maxrate".to_string()));
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn test_audio_and_thread_args_on_both_tiers() {
        for profile in [
            EncoderProfile::software(),
            EncoderProfile::for_video_codec(QSV_VIDEO_CODEC),
        ] {
            let args = profile.quality_args();
            assert!(args.contains(&"-c:a".to_string()));
            assert!(args.contains(&"aac".to_string()));
            assert!(args.contains(&"-threads".to_string()));
        }
    }

    #[test]
    fn test_vendor_labels() {
        assert_eq!(
            EncoderProfile::for_video_codec("h264_nvenc").label,
            "NVIDIA NVENC H.264"
        );
        assert_eq!(
            EncoderProfile::for_video_codec("h264_amf").label,
            "AMD AMF H.264"
        );
        assert_eq!(
            EncoderProfile::for_video_codec("h264_qsv").label,
            "Intel Quick Sync Video"
        );
        assert_eq!(EncoderProfile::software().label, "CPU (libx264)");
    }

    #[test]
    fn test_unknown_codec_falls_back_to_software() {
        let profile = EncoderProfile::for_video_codec("hevc_videotoolbox");
        assert!(profile.is_software());
        assert_eq!(profile.video_codec, "libx264");
    }

    #[test]
    fn test_tier_serialization() {
        let json = serde_json::to_string(&EncoderTier::Hardware).unwrap();
        assert_eq!(json, "\"hardware\"");
        let parsed: EncoderTier = serde_json::from_str("\"software\"").unwrap();
        assert_eq!(parsed, EncoderTier::Software);
    }
}
