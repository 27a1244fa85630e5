// ============================================================================
// reframe-core/src/encoding/selector.rs
// ============================================================================
//
// ENCODER SELECTION: Detection, Functional Tests and Diagnostics
//
// Advertised support (`ffmpeg -encoders`) is necessary but not sufficient.
// A hardware encoder is only selected after a short synthetic encode with it
// succeeds. When that fails, a slower diagnosis decides whether a single
// retry with the simplified parameter set is worth it.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::params::{
    BitrateTriple, EncoderParams, HardwareSelection, HardwareVendor, SOFTWARE_VIDEO_ENCODER,
};
use crate::external::{CommandRunner, is_linux, is_macos};

/// Synthetic source for functional tests.
const TEST_SOURCE: &str = "color=c=black:s=256x256:r=30:d=1";
const TEST_FRAMES: &str = "10";
const TEST_BITRATE_KBPS: u32 = 1_000;

/// Render node checked for Intel drivers on Linux.
const DRI_RENDER_NODE: &str = "/dev/dri/renderD128";

// ============================================================================
// DETECTION
// ============================================================================

/// Video encoders advertised by the local ffmpeg build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableEncoders {
    video_encoders: HashSet<String>,
}

impl AvailableEncoders {
    /// Parses `ffmpeg -hide_banner -encoders` output.
    ///
    /// Encoder lines carry a six character flag field (`V....D`) followed by
    /// the encoder name; the legend above the `------` separator is skipped.
    pub fn parse(stdout: &str) -> Self {
        let mut video_encoders = HashSet::new();
        for line in stdout.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with("Encoders:") {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let flags = match parts.next() {
                Some(flags) if flags.len() == 6 => flags,
                _ => continue,
            };
            // Legend lines look like "V..... = Video"
            let Some(name) = parts.next().filter(|name| *name != "=") else {
                continue;
            };
            if flags.starts_with('V') {
                video_encoders.insert(name.to_string());
            }
        }
        Self { video_encoders }
    }

    pub fn has(&self, encoder: &str) -> bool {
        self.video_encoders.contains(encoder)
    }

    pub fn supports(&self, vendor: HardwareVendor) -> bool {
        self.has(vendor.encoder())
    }

    /// Per-vendor advertised support, in priority order.
    pub fn vendor_support(&self) -> Vec<(HardwareVendor, bool)> {
        HardwareVendor::PRIORITY
            .iter()
            .map(|vendor| (*vendor, self.supports(*vendor)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.video_encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.video_encoders.is_empty()
    }
}

/// Result of `get_optimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "lowercase")]
pub enum OptimalEncoder {
    Hardware(HardwareSelection),
    Software,
}

impl OptimalEncoder {
    pub fn encoder_id(&self) -> &'static str {
        match self {
            OptimalEncoder::Hardware(selection) => selection.vendor.encoder(),
            OptimalEncoder::Software => SOFTWARE_VIDEO_ENCODER,
        }
    }

    pub fn hardware(&self) -> Option<HardwareSelection> {
        match self {
            OptimalEncoder::Hardware(selection) => Some(*selection),
            OptimalEncoder::Software => None,
        }
    }
}

/// Outcome of a hardware diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub vendor: HardwareVendor,
    pub driver_ok: bool,
    pub toolchain_supports_hw: bool,
    pub functional_test: bool,
    pub issues: Vec<String>,
    pub suggested_fixes: Vec<String>,
}

impl DiagnosticReport {
    /// A simplified retry only makes sense when the platform looks healthy
    /// and the full parameter set is what failed.
    pub fn should_retry_simplified(&self) -> bool {
        self.driver_ok && self.toolchain_supports_hw && !self.functional_test
    }
}

// ============================================================================
// SELECTOR
// ============================================================================

/// Picks the best working encoder, caching detection per instance.
pub struct EncoderSelector {
    runner: Arc<dyn CommandRunner>,
    ffmpeg_path: PathBuf,
    availability_timeout: Duration,
    test_timeout: Duration,
    enable_hardware: bool,
    available: OnceCell<AvailableEncoders>,
    optimal: Mutex<HashMap<Option<HardwareVendor>, Arc<OnceCell<OptimalEncoder>>>>,
}

impl EncoderSelector {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        ffmpeg_path: impl Into<PathBuf>,
        availability_timeout: Duration,
        test_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            ffmpeg_path: ffmpeg_path.into(),
            availability_timeout,
            test_timeout,
            enable_hardware: true,
            available: OnceCell::new(),
            optimal: Mutex::new(HashMap::new()),
        }
    }

    /// With hardware disabled `get_optimal` always returns the software encoder.
    #[must_use]
    pub fn with_hardware(mut self, enable_hardware: bool) -> Self {
        self.enable_hardware = enable_hardware;
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Advertised encoders, queried once per selector.
    ///
    /// A failed query is treated as "nothing advertised" so the software
    /// path stays reachable.
    pub fn detect_available(&self) -> &AvailableEncoders {
        self.available.get_or_init(|| {
            let args = vec!["-hide_banner".to_string(), "-encoders".to_string()];
            match self
                .runner
                .run(self.ffmpeg_path.as_os_str(), &args, self.availability_timeout)
            {
                Ok(output) if output.success() => {
                    let encoders = AvailableEncoders::parse(&output.stdout);
                    log::debug!("Detected {} video encoders", encoders.len());
                    for (vendor, supported) in encoders.vendor_support() {
                        log::debug!("  {} ({}): {}", vendor, vendor.encoder(), supported);
                    }
                    encoders
                }
                Ok(output) => {
                    log::warn!(
                        "ffmpeg -encoders exited with {}; assuming no hardware encoders",
                        output.status
                    );
                    AvailableEncoders::default()
                }
                Err(e) => {
                    log::warn!("Could not list ffmpeg encoders: {}", e);
                    AvailableEncoders::default()
                }
            }
        })
    }

    /// Encodes a short synthetic clip with `vendor`'s encoder.
    pub fn functional_test(&self, vendor: HardwareVendor, simplified: bool) -> bool {
        let params = EncoderParams::hardware(
            vendor,
            BitrateTriple::from_bitrate(TEST_BITRATE_KBPS),
            simplified,
        );
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            TEST_SOURCE,
            "-frames:v",
            TEST_FRAMES,
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            vendor.encoder(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(params.to_args());
        args.extend(["-f", "null", "-"].iter().map(|s| s.to_string()));

        match self
            .runner
            .run(self.ffmpeg_path.as_os_str(), &args, self.test_timeout)
        {
            Ok(output) if output.success() => {
                log::debug!(
                    "Functional test passed for {} (simplified: {})",
                    vendor.encoder(),
                    simplified
                );
                true
            }
            Ok(output) => {
                log::debug!(
                    "Functional test failed for {} (simplified: {}): {}",
                    vendor.encoder(),
                    simplified,
                    output.stderr_tail(3).join(" | ")
                );
                false
            }
            Err(e) => {
                log::debug!("Functional test for {} did not run: {}", vendor.encoder(), e);
                false
            }
        }
    }

    /// Best encoder for `preferred`, falling back through the remaining
    /// vendors and finally to the software encoder.
    ///
    /// Results are cached per preferred vendor for the selector's lifetime.
    /// Concurrent callers with the same preference wait for a single search,
    /// so functional tests never run in parallel against one encoder.
    pub fn get_optimal(&self, preferred: Option<HardwareVendor>) -> OptimalEncoder {
        if !self.enable_hardware {
            return OptimalEncoder::Software;
        }
        let cell = Arc::clone(
            self.optimal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(preferred)
                .or_default(),
        );
        *cell.get_or_init(|| {
            let optimal = self.search(preferred);
            log::info!("Selected encoder: {}", optimal.encoder_id());
            optimal
        })
    }

    fn search(&self, preferred: Option<HardwareVendor>) -> OptimalEncoder {
        let available = self.detect_available();
        for vendor in HardwareVendor::search_order(preferred) {
            if !available.supports(vendor) {
                continue;
            }
            if self.functional_test(vendor, false) {
                return OptimalEncoder::Hardware(HardwareSelection {
                    vendor,
                    simplified: false,
                });
            }

            let report = self.diagnose_with(vendor, false);
            for issue in &report.issues {
                log::warn!("{}: {}", vendor.encoder(), issue);
            }
            if report.should_retry_simplified() && self.functional_test(vendor, true) {
                log::info!(
                    "{} works with simplified parameters only",
                    vendor.encoder()
                );
                return OptimalEncoder::Hardware(HardwareSelection {
                    vendor,
                    simplified: true,
                });
            }
            log::warn!("Giving up on {} for this run", vendor.encoder());
        }
        OptimalEncoder::Software
    }

    /// Full diagnosis for `vendor`, including a fresh functional test.
    pub fn diagnose(&self, vendor: HardwareVendor) -> DiagnosticReport {
        let functional = self.functional_test(vendor, false);
        self.diagnose_with(vendor, functional)
    }

    fn diagnose_with(&self, vendor: HardwareVendor, functional_test: bool) -> DiagnosticReport {
        let mut issues = Vec::new();
        let mut suggested_fixes = Vec::new();

        let driver_ok = self.driver_ok(vendor);
        if !driver_ok {
            match vendor {
                HardwareVendor::Nvidia => {
                    issues.push("nvidia-smi did not report a working GPU".to_string());
                    suggested_fixes
                        .push("Install or update the NVIDIA driver and reboot".to_string());
                }
                HardwareVendor::Intel => {
                    issues.push(format!("{DRI_RENDER_NODE} is not accessible"));
                    suggested_fixes.push(
                        "Install the Intel media driver and add the user to the 'render' group"
                            .to_string(),
                    );
                }
                HardwareVendor::Apple => {
                    issues.push("VideoToolbox is only available on macOS".to_string());
                    suggested_fixes.push("Disable hardware encoding on this host".to_string());
                }
            }
        }

        let toolchain_supports_hw = self.toolchain_supports(vendor);
        if !toolchain_supports_hw {
            issues.push(format!(
                "ffmpeg does not list the '{}' hardware accelerator",
                vendor.accelerator()
            ));
            suggested_fixes.push(format!(
                "Use an ffmpeg build compiled with {} support",
                vendor.accelerator()
            ));
        }

        if !functional_test {
            issues.push(format!("Test encode with {} failed", vendor.encoder()));
            if driver_ok && toolchain_supports_hw {
                suggested_fixes.push(
                    "Retry with simplified parameters (bitrate only, no preset/quality)"
                        .to_string(),
                );
            }
        }

        DiagnosticReport {
            vendor,
            driver_ok,
            toolchain_supports_hw,
            functional_test,
            issues,
            suggested_fixes,
        }
    }

    fn driver_ok(&self, vendor: HardwareVendor) -> bool {
        match vendor {
            HardwareVendor::Nvidia => self.command_succeeds("nvidia-smi", &[]),
            HardwareVendor::Intel => {
                (is_linux() && Path::new(DRI_RENDER_NODE).exists())
                    || self.command_succeeds("vainfo", &[])
            }
            HardwareVendor::Apple => is_macos(),
        }
    }

    fn toolchain_supports(&self, vendor: HardwareVendor) -> bool {
        let args = vec!["-hide_banner".to_string(), "-hwaccels".to_string()];
        match self
            .runner
            .run(self.ffmpeg_path.as_os_str(), &args, self.availability_timeout)
        {
            Ok(output) if output.success() => parse_hwaccels(&output.stdout)
                .iter()
                .any(|accel| accel == vendor.accelerator()),
            Ok(_) | Err(_) => false,
        }
    }

    fn command_succeeds(&self, program: &str, args: &[&str]) -> bool {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner
            .run(OsStr::new(program), &args, self.availability_timeout)
            .map(|output| output.success())
            .unwrap_or(false)
    }
}

/// Parses `ffmpeg -hwaccels` output (header line, then one method per line).
pub fn parse_hwaccels(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mocks::{MockCommandResponse, MockCommandRunner};

    const ENCODERS: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D h264_qsv             H.264 / AVC / MPEG-4 AVC (Intel Quick Sync Video acceleration) (codec h264)
 A....D aac                  AAC (Advanced Audio Coding)
";

    const HWACCELS: &str = "Hardware acceleration methods:
cuda
qsv
";

    fn selector(runner: &MockCommandRunner) -> EncoderSelector {
        EncoderSelector::new(
            Arc::new(runner.clone()),
            "ffmpeg",
            Duration::from_secs(2),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_parse_encoders_list() {
        let encoders = AvailableEncoders::parse(ENCODERS);
        assert!(encoders.has("libx264"));
        assert!(encoders.supports(HardwareVendor::Nvidia));
        assert!(encoders.supports(HardwareVendor::Intel));
        assert!(!encoders.supports(HardwareVendor::Apple));
        assert!(!encoders.has("aac"));
        assert!(!encoders.has("="));
        assert_eq!(encoders.len(), 3);
    }

    #[test]
    fn test_parse_hwaccels() {
        assert_eq!(parse_hwaccels(HWACCELS), vec!["cuda", "qsv"]);
    }

    #[test]
    fn test_detection_runs_once() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        let selector = selector(&runner);

        assert!(selector.detect_available().supports(HardwareVendor::Nvidia));
        assert!(selector.detect_available().supports(HardwareVendor::Intel));
        assert_eq!(runner.count_calls_matching("-encoders"), 1);
    }

    #[test]
    fn test_detection_failure_means_nothing_advertised() {
        let runner = MockCommandRunner::new();
        let selector = selector(&runner);
        assert!(selector.detect_available().is_empty());
        assert_eq!(selector.get_optimal(None), OptimalEncoder::Software);
    }

    #[test]
    fn test_preferred_vendor_used_when_functional() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        runner.respond("ffmpeg", "h264_qsv", MockCommandResponse::success(""));
        let selector = selector(&runner);

        let optimal = selector.get_optimal(Some(HardwareVendor::Intel));
        assert_eq!(optimal.encoder_id(), "h264_qsv");
        assert_eq!(runner.count_calls_matching("h264_nvenc"), 0);
    }

    #[test]
    fn test_advertised_but_broken_falls_through_to_next_vendor() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        runner.respond("ffmpeg", "-hwaccels", MockCommandResponse::success(HWACCELS));
        runner.respond(
            "ffmpeg",
            "h264_nvenc",
            MockCommandResponse::failure(1, "Cannot load libcuda.so.1"),
        );
        runner.respond("ffmpeg", "h264_qsv", MockCommandResponse::success(""));
        // nvidia-smi is not installed: driver check fails, no simplified retry.
        let selector = selector(&runner);

        let optimal = selector.get_optimal(None);
        assert_eq!(
            optimal,
            OptimalEncoder::Hardware(HardwareSelection {
                vendor: HardwareVendor::Intel,
                simplified: false,
            })
        );
        assert_eq!(runner.count_calls_matching("h264_nvenc"), 1);
    }

    #[test]
    fn test_all_hardware_broken_returns_software() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        runner.respond("ffmpeg", "-hwaccels", MockCommandResponse::success(HWACCELS));
        runner.respond("ffmpeg", "h264_", MockCommandResponse::failure(1, "error"));
        let selector = selector(&runner);

        assert_eq!(selector.get_optimal(None).encoder_id(), SOFTWARE_VIDEO_ENCODER);
    }

    #[test]
    fn test_simplified_retry_after_healthy_diagnosis() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        runner.respond("ffmpeg", "-hwaccels", MockCommandResponse::success(HWACCELS));
        // The full parameter set fails; the bitrate-only one passes.
        runner.respond(
            "ffmpeg",
            "p5",
            MockCommandResponse::failure(1, "InitializeEncoder failed: invalid param (8)"),
        );
        runner.respond("ffmpeg", "h264_nvenc", MockCommandResponse::success(""));
        runner.respond("nvidia-smi", "", MockCommandResponse::success("GPU 0"));
        let selector = selector(&runner);

        let optimal = selector.get_optimal(Some(HardwareVendor::Nvidia));
        assert_eq!(
            optimal,
            OptimalEncoder::Hardware(HardwareSelection {
                vendor: HardwareVendor::Nvidia,
                simplified: true,
            })
        );
        assert_eq!(runner.count_calls_matching("h264_nvenc"), 2);
    }

    #[test]
    fn test_optimal_is_cached_per_preference() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        runner.respond("ffmpeg", "h264_nvenc", MockCommandResponse::success(""));
        let selector = selector(&runner);

        selector.get_optimal(None);
        selector.get_optimal(None);
        assert_eq!(runner.count_calls_matching("h264_nvenc"), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_search_per_preference() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-encoders", MockCommandResponse::success(ENCODERS));
        runner.respond("ffmpeg", "h264_nvenc", MockCommandResponse::success(""));
        runner.respond("ffmpeg", "h264_qsv", MockCommandResponse::success(""));
        runner.set_latency(Duration::from_millis(20));
        let selector = selector(&runner);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let selector = &selector;
                scope.spawn(move || {
                    let preferred = if worker % 2 == 0 {
                        HardwareVendor::Nvidia
                    } else {
                        HardwareVendor::Intel
                    };
                    let optimal = selector.get_optimal(Some(preferred));
                    assert_eq!(optimal.hardware().map(|hw| hw.vendor), Some(preferred));
                });
            }
        });

        assert_eq!(runner.count_calls_matching("lavfi"), 2);
        assert_eq!(runner.count_calls_matching("h264_nvenc"), 1);
        assert_eq!(runner.count_calls_matching("h264_qsv"), 1);
        assert_eq!(runner.count_calls_matching("-encoders"), 1);
    }

    #[test]
    fn test_hardware_disabled_skips_detection() {
        let runner = MockCommandRunner::new();
        let selector = selector(&runner).with_hardware(false);
        assert_eq!(selector.get_optimal(None), OptimalEncoder::Software);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_diagnose_reports_missing_toolchain_support() {
        let runner = MockCommandRunner::new();
        runner.respond(
            "ffmpeg",
            "-hwaccels",
            MockCommandResponse::success("Hardware acceleration methods:\nvaapi\n"),
        );
        runner.respond("nvidia-smi", "", MockCommandResponse::success("GPU 0"));
        let selector = selector(&runner);

        let report = selector.diagnose(HardwareVendor::Nvidia);
        assert!(report.driver_ok);
        assert!(!report.toolchain_supports_hw);
        assert!(!report.functional_test);
        assert!(!report.should_retry_simplified());
        assert!(report.issues.iter().any(|i| i.contains("cuda")));
        assert!(!report.suggested_fixes.is_empty());
    }
}
