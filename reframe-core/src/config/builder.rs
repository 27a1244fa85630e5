// ============================================================================
// reframe-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of CoreConfig on top of its defaults. The CLI uses it
// to layer command-line flags over `CoreConfig::from_env()`.

use std::path::PathBuf;
use std::time::Duration;

use super::CoreConfig;
use crate::encoding::HardwareVendor;
use crate::transform::TargetProfile;

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use reframe_core::config::CoreConfigBuilder;
/// use reframe_core::encoding::HardwareVendor;
/// use std::time::Duration;
///
/// let config = CoreConfigBuilder::new()
///     .preferred_vendor(Some(HardwareVendor::Nvidia))
///     .cache_ttl(Some(Duration::from_secs(600)))
///     .software_crf(20)
///     .build();
/// assert_eq!(config.encoding.software_crf, 20);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// Starts from `CoreConfig::default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration, e.g. `CoreConfig::from_env()`.
    pub fn from_config(config: CoreConfig) -> Self {
        Self { config }
    }

    pub fn target(mut self, target: TargetProfile) -> Self {
        self.config.target = target;
        self
    }

    pub fn ffmpeg_path(mut self, path: PathBuf) -> Self {
        self.config.ffmpeg_path = path;
        self
    }

    pub fn ffprobe_path(mut self, path: PathBuf) -> Self {
        self.config.ffprobe_path = path;
        self
    }

    pub fn mediainfo_path(mut self, path: PathBuf) -> Self {
        self.config.mediainfo_path = path;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn availability_timeout(mut self, timeout: Duration) -> Self {
        self.config.availability_timeout = timeout;
        self
    }

    /// Sets the cache TTL. `None` keeps entries for the process lifetime.
    pub fn cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn parallel_jobs(mut self, jobs: usize) -> Self {
        self.config.parallel_jobs = jobs;
        self
    }

    pub fn enable_hardware(mut self, enable: bool) -> Self {
        self.config.enable_hardware = enable;
        self
    }

    pub fn preferred_vendor(mut self, vendor: Option<HardwareVendor>) -> Self {
        self.config.preferred_vendor = vendor;
        self
    }

    pub fn software_preset(mut self, preset: &str) -> Self {
        self.config.encoding.software_preset = preset.to_string();
        self
    }

    /// Sets the software tier CRF (0-51, lower is higher quality).
    pub fn software_crf(mut self, crf: u8) -> Self {
        self.config.encoding.software_crf = crf;
        self
    }

    pub fn audio_codec(mut self, codec: &str) -> Self {
        self.config.encoding.audio_codec = codec.to_string();
        self
    }

    pub fn audio_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.config.encoding.audio_bitrate_kbps = kbps;
        self
    }

    pub fn transcode_timeout_factor(mut self, factor: Option<f64>) -> Self {
        self.config.transcode_timeout_factor = factor;
        self
    }

    pub fn preserve_4k_hevc_landscape(mut self, preserve: bool) -> Self {
        self.config.preserve_4k_hevc_landscape = preserve;
        self
    }

    /// Builds the configuration. Call `CoreConfig::validate` before use.
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TargetAspect;

    #[test]
    fn test_builder_defaults_match_config_defaults() {
        assert_eq!(CoreConfigBuilder::new().build(), CoreConfig::default());
    }

    #[test]
    fn test_builder_overrides() {
        let config = CoreConfigBuilder::new()
            .target(TargetAspect::Landscape.into())
            .ffprobe_path(PathBuf::from("/usr/local/bin/ffprobe"))
            .parallel_jobs(1)
            .enable_hardware(false)
            .audio_bitrate_kbps(128)
            .transcode_timeout_factor(Some(2.0))
            .build();

        assert_eq!(config.target, TargetProfile::new(1920, 1080));
        assert_eq!(config.ffprobe_path, PathBuf::from("/usr/local/bin/ffprobe"));
        assert_eq!(config.parallel_jobs, 1);
        assert!(!config.enable_hardware);
        assert_eq!(config.encoding.audio_bitrate_kbps, 128);
        assert_eq!(config.transcode_timeout_factor, Some(2.0));
    }

    #[test]
    fn test_builder_layers_over_existing_config() {
        let base = CoreConfig {
            parallel_jobs: 3,
            ..CoreConfig::default()
        };
        let config = CoreConfigBuilder::from_config(base).software_crf(18).build();
        assert_eq!(config.parallel_jobs, 3);
        assert_eq!(config.encoding.software_crf, 18);
    }
}
