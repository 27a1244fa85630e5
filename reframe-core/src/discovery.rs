//! File discovery for batch runs.
//!
//! Scans the top level of a directory for supported clips and stills.
//! Subdirectories are not searched.

use crate::error::{CoreError, CoreResult};
use crate::media::MediaKind;

use std::path::{Path, PathBuf};

/// Finds media files eligible for normalization in `input_dir`.
///
/// Matching is by extension, case-insensitive, against the video and image
/// extensions `MediaKind::from_path` recognizes. Results are sorted so batch
/// order is stable.
///
/// # Errors
///
/// * `CoreError::Io` if the directory cannot be read
/// * `CoreError::InvalidInput` if no supported files are found
pub fn find_processable_files(input_dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let read_dir = std::fs::read_dir(input_dir)?;
    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            if !path.is_file() {
                return None;
            }
            MediaKind::from_path(&path).map(|_| path)
        })
        .collect();

    if files.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "no supported media files found in {}",
            input_dir.display()
        )));
    }
    files.sort();
    Ok(files)
}
