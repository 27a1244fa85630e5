// ============================================================================
// reframe-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with ffmpeg, ffprobe and mediainfo
//
// This module encapsulates every subprocess the library starts. Each kind of
// interaction sits behind a trait so that the planner, selector and engine
// can be exercised without the real toolchain.
//
// KEY COMPONENTS:
// - CommandRunner: short blocking commands with a timeout (probes, checks)
// - MetadataBackend: ffprobe and mediainfo metadata backends
// - FfmpegSpawner / FfmpegProcess: long-running transcodes with event streams
// - mocks: test doubles for all of the above
// - Dependency checking and platform detection

use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

// ============================================================================
// SUBMODULES
// ============================================================================

pub mod backend;
pub mod command;
pub mod ffmpeg_executor;
pub mod ffprobe_executor;
pub mod mediainfo_executor;
pub mod mocks;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use backend::{BackendKind, MetadataBackend};
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use ffmpeg_executor::{FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner};
pub use ffprobe_executor::FfprobeBackend;
pub use mediainfo_executor::MediaInfoBackend;

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks that `program` can be started, by running it with `-version`.
///
/// Only a failure to start counts; a non-zero exit from the version flag is
/// accepted since some builds print the version on stderr and exit 1.
pub fn check_dependency(
    runner: &dyn CommandRunner,
    program: &Path,
    timeout: Duration,
) -> CoreResult<()> {
    match runner.run(program.as_os_str(), &["-version".to_string()], timeout) {
        Ok(_) => {
            log::debug!("Found dependency: {}", program.display());
            Ok(())
        }
        Err(CoreError::DependencyNotFound(name)) => {
            log::warn!("Dependency '{}' not found.", name);
            Err(CoreError::DependencyNotFound(name))
        }
        Err(e) => {
            log::error!(
                "Failed to run dependency check for '{}': {}",
                program.display(),
                e
            );
            Err(e)
        }
    }
}

// ============================================================================
// PLATFORM DETECTION
// ============================================================================

/// Checks if the current platform is macOS.
pub fn is_macos() -> bool {
    env::consts::OS == "macos"
}

/// Checks if the current platform is Linux.
pub fn is_linux() -> bool {
    env::consts::OS == "linux"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mocks::{MockCommandResponse, MockCommandRunner};

    #[test]
    fn test_check_dependency() {
        let runner = MockCommandRunner::new();
        runner.respond("ffmpeg", "-version", MockCommandResponse::success("ffmpeg version 6.1"));

        assert!(check_dependency(&runner, Path::new("ffmpeg"), Duration::from_secs(2)).is_ok());
        assert!(matches!(
            check_dependency(&runner, Path::new("ffprobe"), Duration::from_secs(2)),
            Err(CoreError::DependencyNotFound(_))
        ));
    }

    #[test]
    fn test_platform_flags_are_exclusive() {
        assert!(!(is_macos() && is_linux()));
    }
}
