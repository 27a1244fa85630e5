// ============================================================================
// reframe-cli/src/commands/normalize.rs
// ============================================================================
//
// NORMALIZE COMMAND: Batch Normalization of Media Files
//
// Resolves the input into a file list, layers the command-line flags over
// `CoreConfig::from_env()`, builds the `Normalizer` (the composition root
// for cache, extractor, selector and engine) and prints a batch summary.
// Exits with an error when any item failed.

use reframe_core::external::{SystemCommandRunner, check_dependency};
use reframe_core::{
    CancellationToken, CoreConfig, CoreConfigBuilder, CoreError, ItemStatus, MediaKind,
    Normalizer, find_processable_files, format_bytes, format_duration,
};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli::NormalizeArgs;

/// Resolves `input` into the list of files to process.
pub fn resolve_inputs(input: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let input = input
        .canonicalize()
        .map_err(|e| format!("Invalid input path '{}': {}", input.display(), e))?;
    let metadata = fs::metadata(&input)
        .map_err(|e| format!("Failed to access input path '{}': {}", input.display(), e))?;

    if metadata.is_dir() {
        match find_processable_files(&input) {
            Ok(files) => Ok(files),
            Err(CoreError::InvalidInput(msg)) => {
                log::warn!("{}", msg);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    } else if metadata.is_file() {
        if MediaKind::from_path(&input).is_none() {
            return Err(format!(
                "Input file '{}' is not a supported media file.",
                input.display()
            )
            .into());
        }
        Ok(vec![input])
    } else {
        Err(format!(
            "Input path '{}' is neither a file nor a directory.",
            input.display()
        )
        .into())
    }
}

/// Applies the command-line flags on top of `base`.
pub fn build_config(args: &NormalizeArgs, base: CoreConfig) -> CoreConfig {
    let mut builder = CoreConfigBuilder::from_config(base).target(args.aspect.into());
    if let Some(jobs) = args.jobs {
        builder = builder.parallel_jobs(jobs);
    }
    if args.vendor.is_some() {
        builder = builder.preferred_vendor(args.vendor);
    }
    if args.no_hardware {
        builder = builder.enable_hardware(false);
    }
    builder.build()
}

/// One summary line for an item's outcome.
fn item_line(status: &ItemStatus) -> String {
    match status {
        ItemStatus::Normalized {
            output,
            tier,
            encoder,
            bytes,
        } => format!(
            "normalized -> {} ({}, {} via {})",
            output.display(),
            format_bytes(*bytes),
            tier,
            encoder
        ),
        ItemStatus::Unchanged => "unchanged".to_string(),
        ItemStatus::Failed { reason } => format!("FAILED: {reason}"),
        ItemStatus::Skipped { reason } => format!("skipped: {reason}"),
    }
}

pub fn run_normalize(args: NormalizeArgs) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let files = resolve_inputs(&args.input_path)?;
    if files.is_empty() {
        println!("No processable media files found in {}", args.input_path.display());
        return Ok(());
    }

    let config = build_config(&args, CoreConfig::from_env());
    config.validate()?;

    let runner = SystemCommandRunner;
    check_dependency(&runner, &config.ffmpeg_path, config.availability_timeout)?;
    log::info!("ffmpeg found: {}", config.ffmpeg_path.display());

    fs::create_dir_all(&args.output_dir)?;
    let normalizer = Normalizer::from_config(config)?;
    let summary = normalizer.process_batch(&files, &args.output_dir, &CancellationToken::new())?;

    println!();
    println!("Summary");
    for item in &summary.items {
        let name = item
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.source.display().to_string());
        println!(
            "  {:<32} {} [{}]",
            name,
            item_line(&item.status),
            format_duration(item.elapsed.as_secs_f64())
        );
    }
    println!(
        "Processed: {}  Failed: {}  Skipped: {}  Total time: {}",
        summary.processed,
        summary.failed,
        summary.skipped,
        format_duration(start.elapsed().as_secs_f64())
    );
    let cache = normalizer.cache().stats();
    log::debug!(
        "Metadata cache: {} entries, {} hits, {} misses",
        cache.entries,
        cache.hits,
        cache.misses
    );

    if summary.has_failures() {
        return Err(format!("{} of {} file(s) failed", summary.failed, summary.total()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_core::encoding::{EncoderTier, HardwareVendor};
    use reframe_core::transform::{TargetAspect, TargetProfile};

    fn args(jobs: Option<usize>, vendor: Option<HardwareVendor>, no_hardware: bool) -> NormalizeArgs {
        NormalizeArgs {
            input_path: PathBuf::from("in"),
            output_dir: PathBuf::from("out"),
            aspect: TargetAspect::Square,
            jobs,
            vendor,
            no_hardware,
        }
    }

    #[test]
    fn test_item_line_reports_output_size() {
        let line = item_line(&ItemStatus::Normalized {
            output: PathBuf::from("out/clip.mp4"),
            tier: EncoderTier::Software,
            encoder: "libx264".to_string(),
            bytes: 3 * 1024 * 1024,
        });
        assert_eq!(line, "normalized -> out/clip.mp4 (3.00 MiB, software via libx264)");
        assert_eq!(item_line(&ItemStatus::Unchanged), "unchanged");
    }

    #[test]
    fn test_flags_override_base_config() {
        let base = CoreConfig {
            parallel_jobs: 3,
            ..CoreConfig::default()
        };
        let config = build_config(&args(Some(1), Some(HardwareVendor::Apple), true), base);
        assert_eq!(config.target, TargetProfile::new(1080, 1080));
        assert_eq!(config.parallel_jobs, 1);
        assert_eq!(config.preferred_vendor, Some(HardwareVendor::Apple));
        assert!(!config.enable_hardware);
    }

    #[test]
    fn test_unset_flags_keep_base_values() {
        let base = CoreConfig {
            parallel_jobs: 3,
            preferred_vendor: Some(HardwareVendor::Nvidia),
            ..CoreConfig::default()
        };
        let config = build_config(&args(None, None, false), base);
        assert_eq!(config.parallel_jobs, 3);
        assert_eq!(config.preferred_vendor, Some(HardwareVendor::Nvidia));
        assert!(config.enable_hardware);
    }

    #[test]
    fn test_resolve_inputs() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b.mp4"), b"x")?;
        fs::write(dir.path().join("a.jpg"), b"x")?;
        fs::write(dir.path().join("readme.txt"), b"x")?;

        let files = resolve_inputs(dir.path())?;
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.mp4"]);

        assert!(resolve_inputs(&dir.path().join("readme.txt")).is_err());
        assert!(resolve_inputs(&dir.path().join("missing.mp4")).is_err());
        Ok(())
    }
}
