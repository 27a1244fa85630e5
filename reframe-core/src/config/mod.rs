//! Configuration structures and constants for the reframe-core library.
//!
//! This module provides the configuration for target profile, external tool
//! locations, timeouts, cache policy, parallelism and encoder preferences.
//! Values come from `Default`, the fluent `CoreConfigBuilder` and optional
//! `REFRAME_*` environment overrides.

mod builder;
pub mod utils;

use std::path::PathBuf;
use std::time::Duration;

pub use builder::CoreConfigBuilder;

use crate::encoding::{EncodingSettings, HardwareVendor};
use crate::error::{CoreError, CoreResult};
use crate::transform::{PlannerOptions, TargetAspect, TargetProfile};
use utils::{get_var_bool, get_var_optional, get_var_parsed, get_var_path, get_var_string};

// Default constants

/// Timeout for a single metadata probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for lightweight availability probes (`-version`, `-encoders`).
pub const DEFAULT_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for the default worker count. Consumer GPUs usually allow
/// only a handful of concurrent hardware encode sessions.
pub const DEFAULT_MAX_PARALLEL_JOBS: usize = 4;

pub const DEFAULT_SOFTWARE_PRESET: &str = "medium";
pub const DEFAULT_SOFTWARE_CRF: u8 = 23;
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 192;

/// Highest CRF libx264 accepts for 8-bit output.
pub const MAX_CRF: u8 = 51;

/// `min(num_cpus, DEFAULT_MAX_PARALLEL_JOBS)`, at least 1.
pub fn default_parallel_jobs() -> usize {
    num_cpus::get().clamp(1, DEFAULT_MAX_PARALLEL_JOBS)
}

/// Main configuration structure for the reframe-core library.
///
/// Constructed by the composition root (the CLI) and handed to
/// `Normalizer::from_config`, which builds the shared cache, extractor,
/// selector and engine from it.
///
/// # Examples
///
/// ```rust
/// use reframe_core::config::CoreConfigBuilder;
/// use reframe_core::transform::TargetAspect;
///
/// let config = CoreConfigBuilder::new()
///     .target(TargetAspect::Landscape.into())
///     .parallel_jobs(2)
///     .enable_hardware(false)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Output frame size every item is normalized to
    pub target: TargetProfile,

    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub mediainfo_path: PathBuf,

    pub probe_timeout: Duration,
    pub availability_timeout: Duration,

    /// `None` keeps cache entries for the process lifetime
    pub cache_ttl: Option<Duration>,

    /// Size of the batch worker pool
    pub parallel_jobs: usize,

    pub enable_hardware: bool,
    pub preferred_vendor: Option<HardwareVendor>,

    /// Software tier and audio settings
    pub encoding: EncodingSettings,

    /// Transcode timeout as a multiple of clip duration (min 60 s).
    /// `None` imposes no limit.
    pub transcode_timeout_factor: Option<f64>,

    /// Keep stored rotation on 4K HEVC 16:9 landscape sources
    pub preserve_4k_hevc_landscape: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            target: TargetProfile::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            mediainfo_path: PathBuf::from("mediainfo"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            availability_timeout: DEFAULT_AVAILABILITY_TIMEOUT,
            cache_ttl: None,
            parallel_jobs: default_parallel_jobs(),
            enable_hardware: true,
            preferred_vendor: None,
            encoding: EncodingSettings {
                software_preset: DEFAULT_SOFTWARE_PRESET.to_string(),
                software_crf: DEFAULT_SOFTWARE_CRF,
                audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
                audio_bitrate_kbps: DEFAULT_AUDIO_BITRATE_KBPS,
            },
            transcode_timeout_factor: None,
            preserve_4k_hevc_landscape: false,
        }
    }
}

impl CoreConfig {
    /// Defaults with `REFRAME_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(utils::env_lookup)
    }

    /// Applies `REFRAME_*` overrides read through `lookup`.
    ///
    /// Recognized keys: `REFRAME_TARGET` (portrait/landscape/square),
    /// `REFRAME_FFMPEG`, `REFRAME_FFPROBE`, `REFRAME_MEDIAINFO`,
    /// `REFRAME_PROBE_TIMEOUT_SECS`, `REFRAME_AVAILABILITY_TIMEOUT_SECS`,
    /// `REFRAME_CACHE_TTL_SECS`, `REFRAME_PARALLEL_JOBS`,
    /// `REFRAME_ENABLE_HARDWARE`, `REFRAME_HW_VENDOR`,
    /// `REFRAME_SOFTWARE_PRESET`, `REFRAME_SOFTWARE_CRF`,
    /// `REFRAME_AUDIO_CODEC`, `REFRAME_AUDIO_BITRATE_KBPS`,
    /// `REFRAME_TRANSCODE_TIMEOUT_FACTOR`, `REFRAME_PRESERVE_4K_HEVC_LANDSCAPE`.
    #[must_use]
    pub fn with_overrides<L>(self, lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let target = match get_var_optional::<_, TargetAspect>(&lookup, "REFRAME_TARGET", None) {
            Some(aspect) => aspect.into(),
            None => self.target,
        };
        let secs = |key: &str, current: Duration| {
            Duration::try_from_secs_f64(get_var_parsed(&lookup, key, current.as_secs_f64()))
                .unwrap_or(current)
        };

        Self {
            target,
            ffmpeg_path: get_var_path(&lookup, "REFRAME_FFMPEG", self.ffmpeg_path),
            ffprobe_path: get_var_path(&lookup, "REFRAME_FFPROBE", self.ffprobe_path),
            mediainfo_path: get_var_path(&lookup, "REFRAME_MEDIAINFO", self.mediainfo_path),
            probe_timeout: secs("REFRAME_PROBE_TIMEOUT_SECS", self.probe_timeout),
            availability_timeout: secs(
                "REFRAME_AVAILABILITY_TIMEOUT_SECS",
                self.availability_timeout,
            ),
            cache_ttl: get_var_optional(
                &lookup,
                "REFRAME_CACHE_TTL_SECS",
                self.cache_ttl.map(|ttl| ttl.as_secs()),
            )
            .map(Duration::from_secs),
            parallel_jobs: get_var_parsed(&lookup, "REFRAME_PARALLEL_JOBS", self.parallel_jobs),
            enable_hardware: get_var_bool(
                &lookup,
                "REFRAME_ENABLE_HARDWARE",
                self.enable_hardware,
            ),
            preferred_vendor: get_var_optional(
                &lookup,
                "REFRAME_HW_VENDOR",
                self.preferred_vendor,
            ),
            encoding: EncodingSettings {
                software_preset: get_var_string(
                    &lookup,
                    "REFRAME_SOFTWARE_PRESET",
                    self.encoding.software_preset,
                ),
                software_crf: get_var_parsed(
                    &lookup,
                    "REFRAME_SOFTWARE_CRF",
                    self.encoding.software_crf,
                ),
                audio_codec: get_var_string(
                    &lookup,
                    "REFRAME_AUDIO_CODEC",
                    self.encoding.audio_codec,
                ),
                audio_bitrate_kbps: get_var_parsed(
                    &lookup,
                    "REFRAME_AUDIO_BITRATE_KBPS",
                    self.encoding.audio_bitrate_kbps,
                ),
            },
            transcode_timeout_factor: get_var_optional(
                &lookup,
                "REFRAME_TRANSCODE_TIMEOUT_FACTOR",
                self.transcode_timeout_factor,
            ),
            preserve_4k_hevc_landscape: get_var_bool(
                &lookup,
                "REFRAME_PRESERVE_4K_HEVC_LANDSCAPE",
                self.preserve_4k_hevc_landscape,
            ),
        }
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.parallel_jobs == 0 {
            return Err(CoreError::Config("parallel_jobs must be at least 1".into()));
        }
        if self.target.width == 0 || self.target.height == 0 {
            return Err(CoreError::Config(format!(
                "target dimensions must be non-zero, got {}",
                self.target
            )));
        }
        if self.probe_timeout.is_zero() || self.availability_timeout.is_zero() {
            return Err(CoreError::Config("timeouts must be positive".into()));
        }
        if let Some(factor) = self.transcode_timeout_factor {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(CoreError::Config(format!(
                    "transcode_timeout_factor must be positive, got {factor}"
                )));
            }
        }
        if self.encoding.software_crf > MAX_CRF {
            return Err(CoreError::Config(format!(
                "software_crf must be within 0..={MAX_CRF}, got {}",
                self.encoding.software_crf
            )));
        }
        if self.encoding.audio_bitrate_kbps == 0 {
            return Err(CoreError::Config("audio bitrate must be positive".into()));
        }
        Ok(())
    }

    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            preserve_4k_hevc_landscape: self.preserve_4k_hevc_landscape,
        }
    }
}
