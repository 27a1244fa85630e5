// ============================================================================
// reframe-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: fern Dispatch for Console and File Output
//
// The console receives plain `[LEVEL] message` lines on stderr at `info`
// (or `debug` with --verbose). When a log directory is given, every record
// down to `debug` is also written to `reframe_<command>_<timestamp>.log`
// with a wall-clock prefix.
//
// Forwarded ffmpeg output (target "ffmpeg_log") only reaches the console at
// `warn` and above unless --verbose is set.

use log::LevelFilter;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Target used by reframe-core for forwarded ffmpeg log lines.
const FFMPEG_LOG_TARGET: &str = "ffmpeg_log";

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Log file name for a run of `command`.
pub fn log_file_name(command: &str, timestamp: &str) -> String {
    format!("reframe_{command}_{timestamp}.log")
}

/// Installs the global logger. Returns the log file path, if any.
///
/// Must be called at most once per process.
pub fn setup_logging(
    verbose: bool,
    log_dir: Option<&Path>,
    command: &str,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    let console_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let ffmpeg_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let console = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(console_level)
        .level_for(FFMPEG_LOG_TARGET, ffmpeg_level)
        .chain(std::io::stderr());

    let mut dispatch = fern::Dispatch::new().chain(console);

    let log_path = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(log_file_name(command, &get_timestamp()));
            let file = fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} [{}] {}: {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .level(LevelFilter::Debug)
                .chain(fern::log_file(&path)?);
            dispatch = dispatch.chain(file);
            Some(path)
        }
        None => None,
    };

    dispatch.apply()?;
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        assert_eq!(
            log_file_name("normalize", "20240601_123045"),
            "reframe_normalize_20240601_123045.log"
        );
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = get_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.as_bytes()[8], b'_');
        assert!(ts.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }
}
