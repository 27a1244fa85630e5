//! Partial output files.
//!
//! Every encode tier writes into a randomly named partial file next to the
//! requested output. The returned `TempPath` deletes the file when dropped,
//! so only a partial that is explicitly persisted survives a failed tier.

use crate::error::CoreResult;
use std::path::Path;
use tempfile::{Builder as TempFileBuilder, TempPath};

/// Creates an empty partial file beside `output`, keeping its extension so
/// ffmpeg picks the same muxer. Auto-deleted when dropped.
pub fn create_partial_output(output: &Path) -> CoreResult<TempPath> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let suffix = output
        .extension()
        .map(|ext| format!(".partial.{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".partial".to_string());

    let file = TempFileBuilder::new()
        .prefix(&format!(".{stem}."))
        .suffix(&suffix)
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}
