// ============================================================================
// reframe-core/src/encoding/params.rs
// ============================================================================
//
// ENCODER PARAMETERS: Tiers, Vendors and Rate Control
//
// An `EncoderChoice` is the ordered list of candidates the execution engine
// walks through. The list is always strictly descending in tier, always
// contains the software tier for video and always ends with stream copy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::media::MediaKind;
use crate::transform::TransformPlan;

/// Software video encoder. Assumed functional on every host.
pub const SOFTWARE_VIDEO_ENCODER: &str = "libx264";

/// Pseudo-encoder for stream copy.
pub const COPY_ENCODER: &str = "copy";

/// Still image encoders.
pub const PNG_ENCODER: &str = "png";
pub const JPEG_ENCODER: &str = "mjpeg";

/// Codec name of every encoded video output.
pub const OUTPUT_VIDEO_CODEC: &str = "h264";

/// Quality level shared by the hardware parameter sets.
const HARDWARE_QUALITY: u8 = 23;

/// JPEG quality scale for `-q:v` (2 is near-lossless).
const JPEG_QUALITY: u8 = 2;

// ---- Bitrate ladder (kbps) by target pixel count ----
const UHD_PIXELS: u64 = 3840 * 2160;
const FHD_PIXELS: u64 = 1920 * 1080;
const UHD_BASE_KBPS: u32 = 20_000;
const FHD_BASE_KBPS: u32 = 8_000;
const SD_BASE_KBPS: u32 = 5_000;

// ============================================================================
// TIERS AND VENDORS
// ============================================================================

/// One ranked attempt in the fallback chain, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderTier {
    Hardware,
    Software,
    Copy,
}

impl fmt::Display for EncoderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderTier::Hardware => "hardware",
            EncoderTier::Software => "software",
            EncoderTier::Copy => "copy",
        };
        write!(f, "{name}")
    }
}

/// Hardware encoder families, in fixed fallback priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareVendor {
    Nvidia,
    Intel,
    Apple,
}

impl HardwareVendor {
    /// Fallback order used when the preferred vendor is unusable.
    pub const PRIORITY: [HardwareVendor; 3] = [
        HardwareVendor::Nvidia,
        HardwareVendor::Intel,
        HardwareVendor::Apple,
    ];

    /// H.264 encoder identifier in ffmpeg.
    pub fn encoder(self) -> &'static str {
        match self {
            HardwareVendor::Nvidia => "h264_nvenc",
            HardwareVendor::Intel => "h264_qsv",
            HardwareVendor::Apple => "h264_videotoolbox",
        }
    }

    /// Name listed by `ffmpeg -hwaccels` for this vendor.
    pub fn accelerator(self) -> &'static str {
        match self {
            HardwareVendor::Nvidia => "cuda",
            HardwareVendor::Intel => "qsv",
            HardwareVendor::Apple => "videotoolbox",
        }
    }

    /// `preferred` first, then the remaining vendors in priority order.
    pub fn search_order(preferred: Option<HardwareVendor>) -> Vec<HardwareVendor> {
        let mut order: Vec<HardwareVendor> = preferred.into_iter().collect();
        order.extend(
            Self::PRIORITY
                .iter()
                .copied()
                .filter(|vendor| Some(*vendor) != preferred),
        );
        order
    }

    /// Tuned flags for the full (non-simplified) parameter set.
    fn tuning(self) -> Vec<String> {
        let quality = HARDWARE_QUALITY.to_string();
        match self {
            HardwareVendor::Nvidia => vec![
                "-preset".into(),
                "p5".into(),
                "-rc".into(),
                "vbr".into(),
                "-cq".into(),
                quality,
            ],
            HardwareVendor::Intel => vec![
                "-preset".into(),
                "medium".into(),
                "-global_quality".into(),
                quality,
            ],
            HardwareVendor::Apple => vec!["-realtime".into(), "0".into()],
        }
    }
}

impl fmt::Display for HardwareVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardwareVendor::Nvidia => "nvidia",
            HardwareVendor::Intel => "intel",
            HardwareVendor::Apple => "apple",
        };
        write!(f, "{name}")
    }
}

impl FromStr for HardwareVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nvidia" | "nvenc" => Ok(HardwareVendor::Nvidia),
            "intel" | "qsv" => Ok(HardwareVendor::Intel),
            "apple" | "videotoolbox" => Ok(HardwareVendor::Apple),
            other => Err(format!(
                "unknown hardware vendor '{other}' (expected nvidia, intel or apple)"
            )),
        }
    }
}

// ============================================================================
// RATE CONTROL
// ============================================================================

/// Target bitrate with its VBV ceiling and buffer, all in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateTriple {
    pub bitrate_kbps: u32,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
}

impl BitrateTriple {
    pub fn from_bitrate(bitrate_kbps: u32) -> Self {
        Self {
            bitrate_kbps,
            maxrate_kbps: bitrate_kbps.saturating_mul(3) / 2,
            bufsize_kbps: bitrate_kbps.saturating_mul(2),
        }
    }

    /// Base rate for the plan's target size, scaled by its bitrate boost.
    pub fn for_plan(plan: &TransformPlan) -> Self {
        let pixels = u64::from(plan.target_width) * u64::from(plan.target_height);
        let base = if pixels >= UHD_PIXELS {
            UHD_BASE_KBPS
        } else if pixels >= FHD_PIXELS {
            FHD_BASE_KBPS
        } else {
            SD_BASE_KBPS
        };
        let boosted = (f64::from(base) * plan.bitrate_boost.max(1.0)).round();
        Self::from_bitrate(boosted as u32)
    }
}

/// Settings shared by the software tier and the audio track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingSettings {
    pub software_preset: String,
    pub software_crf: u8,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            software_preset: "medium".to_string(),
            software_crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
        }
    }
}

/// Encoder-specific flags for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncoderParams {
    /// Preset / quality flags placed after `-c:v`.
    pub tuning: Vec<String>,
    pub bitrate: Option<BitrateTriple>,
    /// Emit only `-maxrate`/`-bufsize`, leaving a quality target in charge.
    pub cap_only: bool,
}

impl EncoderParams {
    /// Hardware parameter set. The simplified form drops preset and quality
    /// flags and keeps only the bitrate triple.
    pub fn hardware(vendor: HardwareVendor, bitrate: BitrateTriple, simplified: bool) -> Self {
        Self {
            tuning: if simplified { Vec::new() } else { vendor.tuning() },
            bitrate: Some(bitrate),
            cap_only: false,
        }
    }

    /// Conservative software parameters: fixed preset and CRF, rate capped.
    pub fn software(settings: &EncodingSettings, bitrate: BitrateTriple) -> Self {
        Self {
            tuning: vec![
                "-preset".to_string(),
                settings.software_preset.clone(),
                "-crf".to_string(),
                settings.software_crf.to_string(),
            ],
            bitrate: Some(bitrate),
            cap_only: true,
        }
    }

    pub fn image(encoder: &str) -> Self {
        let tuning = if encoder == JPEG_ENCODER {
            vec!["-q:v".to_string(), JPEG_QUALITY.to_string()]
        } else {
            Vec::new()
        };
        Self {
            tuning,
            bitrate: None,
            cap_only: false,
        }
    }

    /// Flags following `-c:v <encoder>`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = self.tuning.clone();
        if let Some(rate) = self.bitrate {
            if !self.cap_only {
                args.push("-b:v".to_string());
                args.push(format!("{}k", rate.bitrate_kbps));
            }
            args.push("-maxrate".to_string());
            args.push(format!("{}k", rate.maxrate_kbps));
            args.push("-bufsize".to_string());
            args.push(format!("{}k", rate.bufsize_kbps));
        }
        args
    }
}

// ============================================================================
// CANDIDATES
// ============================================================================

/// A hardware encoder that passed its functional test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareSelection {
    pub vendor: HardwareVendor,
    /// Only the bitrate-only parameter set passed the functional test.
    pub simplified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCandidate {
    pub tier: EncoderTier,
    pub encoder: String,
    pub vendor: Option<HardwareVendor>,
    pub params: EncoderParams,
}

impl EncoderCandidate {
    pub fn copy() -> Self {
        Self {
            tier: EncoderTier::Copy,
            encoder: COPY_ENCODER.to_string(),
            vendor: None,
            params: EncoderParams::default(),
        }
    }

    /// Codec name of what this candidate writes, or `None` for stream copy.
    pub fn output_codec(&self) -> Option<&str> {
        match self.tier {
            EncoderTier::Copy => None,
            _ if self.encoder == PNG_ENCODER || self.encoder == JPEG_ENCODER => {
                Some(self.encoder.as_str())
            }
            _ => Some(OUTPUT_VIDEO_CODEC),
        }
    }
}

/// Ordered fallback chain for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderChoice {
    candidates: Vec<EncoderCandidate>,
}

impl EncoderChoice {
    /// Builds the chain for a planned item.
    ///
    /// Videos get `[hardware?, software, copy]`; stills get
    /// `[software image encoder, copy]` and never a hardware tier.
    pub fn for_plan(
        plan: &TransformPlan,
        source_codec: &str,
        hardware: Option<HardwareSelection>,
        settings: &EncodingSettings,
    ) -> Self {
        let mut candidates = Vec::with_capacity(3);
        match plan.kind {
            MediaKind::Video => {
                let bitrate = BitrateTriple::for_plan(plan);
                if let Some(selection) = hardware {
                    candidates.push(EncoderCandidate {
                        tier: EncoderTier::Hardware,
                        encoder: selection.vendor.encoder().to_string(),
                        vendor: Some(selection.vendor),
                        params: EncoderParams::hardware(
                            selection.vendor,
                            bitrate,
                            selection.simplified,
                        ),
                    });
                }
                candidates.push(EncoderCandidate {
                    tier: EncoderTier::Software,
                    encoder: SOFTWARE_VIDEO_ENCODER.to_string(),
                    vendor: None,
                    params: EncoderParams::software(settings, bitrate),
                });
            }
            MediaKind::Image => {
                let encoder = if source_codec == PNG_ENCODER {
                    PNG_ENCODER
                } else {
                    JPEG_ENCODER
                };
                candidates.push(EncoderCandidate {
                    tier: EncoderTier::Software,
                    encoder: encoder.to_string(),
                    vendor: None,
                    params: EncoderParams::image(encoder),
                });
            }
        }
        candidates.push(EncoderCandidate::copy());
        Self { candidates }
    }

    pub fn candidates(&self) -> &[EncoderCandidate] {
        &self.candidates
    }

    pub fn tiers(&self) -> Vec<EncoderTier> {
        self.candidates.iter().map(|c| c.tier).collect()
    }

    /// First candidate to try.
    pub fn primary(&self) -> &EncoderCandidate {
        // Never empty: copy is always appended.
        &self.candidates[0]
    }
}
