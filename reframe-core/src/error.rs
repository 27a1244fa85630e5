// ============================================================================
// reframe-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Custom Error Types and Utilities
//
// This module defines the error types used throughout the reframe-core
// library. The variants follow the per-item failure taxonomy: some are fatal
// for a single media item, some only trigger a fallback, and `InvalidInput`
// marks an item that is skipped rather than failed.
//
// KEY COMPONENTS:
// - CoreError: Main error enum for all library operations
// - CoreResult: Type alias for Result with CoreError
// - Helper functions for creating subprocess errors

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

use crate::encoding::EncoderTier;

/// Errors produced by the reframe-core library.
#[derive(Error, Debug)]
pub enum CoreError {
    // ---- Per-item taxonomy ----
    /// The source path does not exist. Fatal for the item, not for the batch.
    #[error("Source not found: {0}")]
    NotFound(PathBuf),

    /// A metadata backend failed or produced malformed output.
    #[error("Metadata unavailable for {path}: {reason}")]
    MetadataUnavailable { path: PathBuf, reason: String },

    /// A single encoder tier failed. Triggers the next tier.
    #[error("{tier} tier failed: {message}")]
    EncodeFailed { tier: EncoderTier, message: String },

    /// Every tier of the fallback chain failed.
    #[error("All {attempts} encoder tiers failed for {path}: {last_error}")]
    AllTiersFailed {
        path: PathBuf,
        attempts: usize,
        last_error: String,
    },

    /// Unsupported or non-media input. Counted as skipped.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    // ---- Subprocess errors ----
    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, #[source] io::Error),

    #[error("Failed waiting for command '{0}': {1}")]
    CommandWait(String, #[source] io::Error),

    #[error("Command '{0}' failed with status {1}: {2}")]
    CommandFailed(String, ExitStatus, String),

    #[error("Command '{0}' timed out after {1:?}")]
    CommandTimeout(String, Duration),

    #[error("Required dependency not found: {0}")]
    DependencyNotFound(String),

    // ---- Parsing / configuration ----
    #[error("Failed to parse JSON output: {0}")]
    JsonParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// True for errors that mark an item as skipped rather than failed.
    pub fn is_skip(&self) -> bool {
        matches!(self, CoreError::InvalidInput(_))
    }
}

/// Result type for reframe-core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Builds a `CommandStart` error, mapping `NotFound` to `DependencyNotFound`.
pub fn command_start_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    let cmd = cmd.into();
    if err.kind() == io::ErrorKind::NotFound {
        CoreError::DependencyNotFound(cmd)
    } else {
        CoreError::CommandStart(cmd, err)
    }
}

pub fn command_wait_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(cmd.into(), err)
}

pub fn command_failed_error(
    cmd: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed(cmd.into(), status, stderr.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_is_skip() {
        assert!(CoreError::InvalidInput("notes.txt".into()).is_skip());
        assert!(!CoreError::NotFound(PathBuf::from("a.mp4")).is_skip());
        assert!(!CoreError::Cancelled.is_skip());
    }

    #[test]
    fn missing_binary_maps_to_dependency_not_found() {
        let err = command_start_error("mediainfo", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, CoreError::DependencyNotFound(name) if name == "mediainfo"));

        let err = command_start_error("ffmpeg", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, CoreError::CommandStart(..)));
    }
}
