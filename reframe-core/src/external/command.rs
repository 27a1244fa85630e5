// ============================================================================
// reframe-core/src/external/command.rs
// ============================================================================
//
// COMMAND RUNNER: Short-Lived External Commands with Timeouts
//
// Probes, availability checks and functional encoder tests are blocking
// commands whose whole output is needed at once. They go through the
// `CommandRunner` trait so that tests can script tool responses.
//
// KEY COMPONENTS:
// - CommandOutput: captured status + stdout/stderr
// - CommandRunner: trait seam for running a command with a timeout
// - SystemCommandRunner: std::process implementation with reader threads,
//   a polling wait loop and kill-on-timeout

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult, command_start_error, command_wait_error};

/// Interval between `try_wait` polls while a command runs.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last `n` non-empty stderr lines, oldest first.
    pub fn stderr_tail(&self, n: usize) -> Vec<String> {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }
}

/// Runs an external program to completion.
///
/// A non-zero exit is returned as `Ok` with the status; only failures to
/// start, wait or finish in time are errors.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &OsStr, args: &[String], timeout: Duration) -> CoreResult<CommandOutput>;
}

/// `CommandRunner` backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &OsStr, args: &[String], timeout: Duration) -> CoreResult<CommandOutput> {
        let name = program.to_string_lossy().into_owned();
        log::debug!("Running command: {} {}", name, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| command_start_error(name.clone(), e))?;

        // Drain both pipes on their own threads so a chatty tool never blocks
        // on a full pipe while we poll for exit.
        let stdout_handle = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });
        let stderr_handle = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut lines = Vec::new();
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    log::trace!("STDERR: {}", line);
                    lines.push(line);
                }
                lines.join("\n")
            })
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::warn!("Command '{}' timed out after {:?}; killed", name, timeout);
                    return Err(CoreError::CommandTimeout(name, timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(command_wait_error(name, e)),
            }
        };

        let stdout = stdout_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            log::debug!("Command '{}' exited with {}", name, status);
        }

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_captures_stdout() {
        let output = SystemCommandRunner
            .run(OsStr::new("echo"), &args(&["hello"]), Duration::from_secs(5))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_non_zero_exit_is_ok_with_status() {
        let output = SystemCommandRunner
            .run(
                OsStr::new("sh"),
                &args(&["-c", "echo broken >&2; exit 3"]),
                Duration::from_secs(5),
            )
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_tail(5), vec!["broken".to_string()]);
    }

    #[test]
    fn test_timeout_kills_process() {
        let result = SystemCommandRunner.run(
            OsStr::new("sleep"),
            &args(&["5"]),
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(CoreError::CommandTimeout(..))));
    }

    #[test]
    fn test_missing_program() {
        let result = SystemCommandRunner.run(
            OsStr::new("reframe-definitely-not-installed"),
            &[],
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CoreError::DependencyNotFound(_))));
    }
}
