//! Transcode monitoring.
//!
//! Scans the event stream of a running ffmpeg for progress markers
//! (`time=`, `bitrate=`) and error markers (`Error`, `Invalid`, `failed`),
//! logs progress at 10% steps and keeps a bounded tail of diagnostic lines
//! for failure reports.

use ffmpeg_sidecar::event::{FfmpegEvent, FfmpegProgress, LogLevel as FfmpegLogLevel};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::utils::{format_duration, parse_ffmpeg_time};

/// Diagnostic lines kept for failure reports.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

const ERROR_MARKERS: [&str; 3] = ["Error", "Invalid", "failed"];

/// Progress fields scraped from a raw stats line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsLine {
    pub time_secs: Option<f64>,
    pub bitrate: Option<String>,
}

/// Parses `frame=... time=00:00:01.50 bitrate=1234.5kbits/s ...`.
///
/// Returns `None` when neither marker is present.
pub fn parse_stats_line(line: &str) -> Option<StatsLine> {
    if !line.contains("time=") && !line.contains("bitrate=") {
        return None;
    }
    // "bitrate= 123.4kbits/s" has a space after '='
    let spaced = line.replace('=', "= ");
    let parts: Vec<&str> = spaced.split_whitespace().collect();
    let mut stats = StatsLine::default();
    for (i, part) in parts.iter().enumerate() {
        let value = parts.get(i + 1).copied();
        match *part {
            "time=" => stats.time_secs = value.and_then(parse_ffmpeg_time),
            "bitrate=" => stats.bitrate = value.map(str::to_string),
            _ => {}
        }
    }
    Some(stats)
}

/// True when `line` carries one of the error markers.
pub fn has_error_marker(line: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Messages ffmpeg prints on stderr that do not indicate a real problem.
fn is_non_critical(message: &str) -> bool {
    message.contains("deprecated pixel format")
        || message.contains("No accelerated colorspace conversion")
        || message.contains("automatically inserted filter")
        || message.contains("Timestamps are unset")
        || message.contains("first frame is no keyframe")
        || message.contains("Skipping NAL unit")
}

fn map_ffmpeg_log_level(level: &FfmpegLogLevel) -> log::Level {
    match level {
        FfmpegLogLevel::Fatal | FfmpegLogLevel::Error => log::Level::Error,
        FfmpegLogLevel::Warning => log::Level::Warn,
        FfmpegLogLevel::Info => log::Level::Info,
        _ => log::Level::Trace,
    }
}

/// Tracks one running transcode.
pub struct TranscodeMonitor {
    label: String,
    duration: Option<f64>,
    start_time: Instant,
    last_logged_threshold: i32,
    current_secs: f64,
    last_bitrate: Option<String>,
    tail: VecDeque<String>,
    errors: Vec<String>,
}

impl TranscodeMonitor {
    /// `duration` is the source length in seconds, when known.
    pub fn new(label: impl Into<String>, duration: Option<f64>) -> Self {
        Self {
            label: label.into(),
            duration: duration.filter(|d| *d > 0.0),
            start_time: Instant::now(),
            last_logged_threshold: -1,
            current_secs: 0.0,
            last_bitrate: None,
            tail: VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES),
            errors: Vec::new(),
        }
    }

    pub fn handle_event(&mut self, event: &FfmpegEvent) {
        match event {
            FfmpegEvent::Progress(progress) => self.handle_progress(progress),
            FfmpegEvent::Log(level, message) => self.handle_log(level, message),
            FfmpegEvent::Error(error) => self.handle_error(error),
            _ => {}
        }
    }

    fn handle_progress(&mut self, progress: &FfmpegProgress) {
        if let Some(secs) = parse_ffmpeg_time(&progress.time) {
            self.current_secs = secs;
        }
        if progress.bitrate_kbps > 0.0 {
            self.last_bitrate = Some(format!("{:.1}kbits/s", progress.bitrate_kbps));
        }
        self.log_progress_if_needed(progress.speed);
    }

    fn handle_log(&mut self, level: &FfmpegLogLevel, message: &str) {
        if let Some(stats) = parse_stats_line(message) {
            if let Some(secs) = stats.time_secs {
                self.current_secs = secs;
            }
            if stats.bitrate.is_some() {
                self.last_bitrate = stats.bitrate;
            }
            return;
        }
        if message.trim().is_empty() {
            return;
        }

        self.push_tail(message);
        let level = map_ffmpeg_log_level(level);
        if level == log::Level::Error || has_error_marker(message) {
            self.record_error(message);
        }
        if level == log::Level::Info {
            log::debug!(target: "ffmpeg_log", "{message}");
        } else {
            log::log!(target: "ffmpeg_log", level, "{message}");
        }
    }

    fn handle_error(&mut self, error: &str) {
        self.push_tail(error);
        if is_non_critical(error) {
            log::debug!("ffmpeg non-critical message: {error}");
        } else {
            self.record_error(error);
            log::debug!(target: "ffmpeg_log", "ffmpeg stderr error: {error}");
        }
    }

    fn record_error(&mut self, message: &str) {
        if !is_non_critical(message) {
            self.errors.push(message.trim().to_string());
        }
    }

    fn push_tail(&mut self, line: &str) {
        if self.tail.len() == DIAGNOSTIC_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.trim_end().to_string());
    }

    fn percent(&self) -> Option<f64> {
        self.duration
            .map(|total| (self.current_secs / total * 100.0).clamp(0.0, 100.0))
    }

    fn log_progress_if_needed(&mut self, speed: f32) {
        let Some(percent) = self.percent() else {
            return;
        };
        let threshold = (percent as i32 / 10) * 10;
        if threshold <= self.last_logged_threshold {
            return;
        }
        self.last_logged_threshold = threshold;
        log::info!(
            target: "reframe::progress",
            "{}: {:.1}% | {} / {} | Speed: {:.2}x | Bitrate: {}",
            self.label,
            percent,
            format_duration(self.current_secs),
            format_duration(self.duration.unwrap_or(0.0)),
            speed,
            self.last_bitrate.as_deref().unwrap_or("n/a")
        );
    }

    /// Seconds of output written so far.
    pub fn current_secs(&self) -> f64 {
        self.current_secs
    }

    pub fn last_bitrate(&self) -> Option<&str> {
        self.last_bitrate.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Last diagnostic lines, oldest first.
    pub fn diagnostic_tail(&self) -> Vec<String> {
        self.tail.iter().cloned().collect()
    }

    /// Most recent line that looked like an error.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }

    /// Short failure summary: last error line, else the last tail line.
    pub fn failure_summary(&self) -> String {
        self.last_error()
            .or_else(|| self.tail.back().map(String::as_str))
            .unwrap_or("no diagnostic output")
            .to_string()
    }
}
