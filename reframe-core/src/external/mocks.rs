// reframe-core/src/external/mocks.rs
//
// --- Mocking Infrastructure (for testing) ---
//
// Test doubles for every external seam: the ffmpeg spawner, the short
// command runner and the metadata backends. They are thread-safe so batch
// tests can run them through the rayon pool.

use super::backend::{BackendKind, MetadataBackend};
use super::command::{CommandOutput, CommandRunner};
use super::ffmpeg_executor::{FfmpegProcess, FfmpegSpawner, command_args};
use crate::encoding::CancellationToken;
use crate::error::{CoreError, CoreResult};
use crate::media::{Degradable, MediaMetadata, MetadataTier, Rotation};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Builds an `ExitStatus` carrying the given exit code.
pub fn exit_status(code: i32) -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// FFMPEG SPAWNER
// ============================================================================

/// Mock implementation of FfmpegProcess.
#[derive(Clone)]
pub struct MockFfmpegProcess {
    /// Events to emit when handle_events is called.
    pub events_to_emit: Vec<FfmpegEvent>,
    /// Exit status to return when wait is called.
    pub exit_status: ExitStatus,
    /// Token cancelled as soon as event handling starts.
    pub cancel_on_start: Option<CancellationToken>,
    /// Set once `kill` has been called.
    pub killed: Arc<AtomicBool>,
}

impl MockFfmpegProcess {
    pub fn new(events: Vec<FfmpegEvent>, exit_code: i32) -> Self {
        Self {
            events_to_emit: events,
            exit_status: exit_status(exit_code),
            cancel_on_start: None,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_start = Some(token);
        self
    }
}

impl FfmpegProcess for MockFfmpegProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        if let Some(token) = &self.cancel_on_start {
            token.cancel();
        }
        for event in self.events_to_emit.clone() {
            handler(event)?;
        }
        Ok(())
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(exit_status(255));
        }
        Ok(self.exit_status)
    }
}

/// Represents an expected ffmpeg command call and its mock result.
pub struct MockFfmpegExpectation {
    pub arg_pattern: String,
    pub result: CoreResult<MockFfmpegProcess>,
    pub create_dummy_output: bool,
}

/// Mock implementation of FfmpegSpawner supporting multiple expectations.
///
/// Each spawn consumes the first expectation whose pattern is contained in
/// any argument. With `create_dummy_output` the last argument (the output
/// path) is written with a few bytes before the process is returned.
#[derive(Clone, Default)]
pub struct MockFfmpegSpawner {
    expectations: Arc<Mutex<Vec<MockFfmpegExpectation>>>,
    received_calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockFfmpegSpawner {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_expectation(
        &self,
        arg_pattern: &str,
        result: CoreResult<MockFfmpegProcess>,
        create_dummy_output: bool,
    ) {
        lock(&self.expectations).push(MockFfmpegExpectation {
            arg_pattern: arg_pattern.to_string(),
            result,
            create_dummy_output,
        });
    }

    pub fn add_success_expectation(&self, arg_pattern: &str, events: Vec<FfmpegEvent>) {
        self.add_expectation(arg_pattern, Ok(MockFfmpegProcess::new(events, 0)), true);
    }

    pub fn add_spawn_error_expectation(&self, arg_pattern: &str, error: CoreError) {
        self.add_expectation(arg_pattern, Err(error), false);
    }

    pub fn add_exit_error_expectation(
        &self,
        arg_pattern: &str,
        events: Vec<FfmpegEvent>,
        exit_code: i32,
    ) {
        self.add_expectation(
            arg_pattern,
            Ok(MockFfmpegProcess::new(events, exit_code)),
            false,
        );
    }

    pub fn get_received_calls(&self) -> Vec<Vec<String>> {
        lock(&self.received_calls).clone()
    }

    pub fn remaining_expectations(&self) -> usize {
        lock(&self.expectations).len()
    }
}

fn write_dummy_output(args: &[String]) {
    let Some(output_path) = args.last().map(PathBuf::from) else {
        log::warn!("MockFfmpegSpawner couldn't find output path in args to create dummy file.");
        return;
    };
    if let Some(parent) = output_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::error!("MockFfmpegSpawner failed to create parent dir {:?}: {}", parent, e);
        }
    }
    match std::fs::write(&output_path, b"mock ffmpeg output") {
        Ok(()) => log::info!("MockFfmpegSpawner created dummy output file: {:?}", output_path),
        Err(e) => log::error!(
            "MockFfmpegSpawner failed to create dummy output file {:?}: {}",
            output_path,
            e
        ),
    }
}

impl FfmpegSpawner for MockFfmpegSpawner {
    type Process = MockFfmpegProcess;

    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        let args = command_args(&cmd);
        lock(&self.received_calls).push(args.clone());

        let expectation = {
            let mut expectations = lock(&self.expectations);
            let found = expectations
                .iter()
                .position(|exp| args.iter().any(|arg| arg.contains(&exp.arg_pattern)));
            found.map(|index| expectations.remove(index))
        };

        let Some(expectation) = expectation else {
            log::error!("MockFfmpegSpawner: No expectation found for command args: {:?}", args);
            return Err(CoreError::InvalidInput(format!(
                "MockFfmpegSpawner: no expectation for {args:?}"
            )));
        };

        log::info!(
            "MockFfmpegSpawner: Matched expectation with pattern '{}'",
            expectation.arg_pattern
        );
        match expectation.result {
            Ok(process) => {
                if expectation.create_dummy_output {
                    write_dummy_output(&args);
                }
                Ok(process)
            }
            Err(err) => {
                log::warn!(
                    "MockFfmpegSpawner simulating spawn error for pattern '{}': {}",
                    expectation.arg_pattern,
                    err
                );
                Err(err)
            }
        }
    }
}

// ============================================================================
// COMMAND RUNNER
// ============================================================================

/// Scripted outcome of a short command.
#[derive(Debug, Clone)]
pub enum MockCommandResponse {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    NotInstalled,
}

impl MockCommandResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        MockCommandResponse::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        MockCommandResponse::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

struct MockCommandRule {
    program: String,
    arg_pattern: String,
    response: MockCommandResponse,
}

/// Mock `CommandRunner`. Rules are matched in insertion order and are not
/// consumed; unmatched commands behave as if the program is not installed.
#[derive(Clone, Default)]
pub struct MockCommandRunner {
    rules: Arc<Mutex<Vec<MockCommandRule>>>,
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    latency: Arc<Mutex<Duration>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Default::default()
    }

    /// Responds to `program` when any argument contains `arg_pattern`
    /// (an empty pattern matches every invocation of the program).
    pub fn respond(&self, program: &str, arg_pattern: &str, response: MockCommandResponse) {
        lock(&self.rules).push(MockCommandRule {
            program: program.to_string(),
            arg_pattern: arg_pattern.to_string(),
            response,
        });
    }

    /// Every call sleeps for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls whose arguments contain `pattern`.
    pub fn count_calls_matching(&self, pattern: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|(_, args)| args.iter().any(|a| a.contains(pattern)))
            .count()
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(&self, program: &OsStr, args: &[String], timeout: Duration) -> CoreResult<CommandOutput> {
        let program = program.to_string_lossy().into_owned();
        lock(&self.calls).push((program.clone(), args.to_vec()));
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let response = lock(&self.rules)
            .iter()
            .find(|rule| {
                program.ends_with(&rule.program)
                    && (rule.arg_pattern.is_empty()
                        || args.iter().any(|a| a.contains(&rule.arg_pattern)))
            })
            .map(|rule| rule.response.clone());

        match response {
            Some(MockCommandResponse::Exit {
                code,
                stdout,
                stderr,
            }) => Ok(CommandOutput {
                status: exit_status(code),
                stdout,
                stderr,
            }),
            Some(MockCommandResponse::Timeout) => Err(CoreError::CommandTimeout(program, timeout)),
            Some(MockCommandResponse::NotInstalled) | None => {
                Err(CoreError::DependencyNotFound(program))
            }
        }
    }
}

// ============================================================================
// METADATA BACKEND
// ============================================================================

/// Mock metadata backend with per-path scripted records.
pub struct MockMetadataBackend {
    kind: BackendKind,
    available: bool,
    records: Mutex<HashMap<PathBuf, Result<Degradable<MediaMetadata>, String>>>,
    side_channel: Mutex<HashMap<PathBuf, Rotation>>,
    probe_calls: AtomicUsize,
    side_channel_calls: AtomicUsize,
}

impl MockMetadataBackend {
    pub fn new(kind: BackendKind, available: bool) -> Self {
        Self {
            kind,
            available,
            records: Mutex::new(HashMap::new()),
            side_channel: Mutex::new(HashMap::new()),
            probe_calls: AtomicUsize::new(0),
            side_channel_calls: AtomicUsize::new(0),
        }
    }

    pub fn expect_metadata(&self, path: &Path, metadata: MediaMetadata) {
        lock(&self.records).insert(path.to_path_buf(), Ok(Degradable::Ok(metadata)));
    }

    pub fn expect_degraded(&self, path: &Path, metadata: MediaMetadata, reason: &str) {
        let record = Degradable::Degraded {
            value: metadata,
            reason: reason.to_string(),
        };
        lock(&self.records).insert(path.to_path_buf(), Ok(record));
    }

    pub fn expect_failure(&self, path: &Path, reason: &str) {
        lock(&self.records).insert(path.to_path_buf(), Err(reason.to_string()));
    }

    pub fn expect_side_channel_rotation(&self, path: &Path, rotation: Rotation) {
        lock(&self.side_channel).insert(path.to_path_buf(), rotation);
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn side_channel_calls(&self) -> usize {
        self.side_channel_calls.load(Ordering::SeqCst)
    }
}

impl MetadataBackend for MockMetadataBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn probe(&self, path: &Path, tier: MetadataTier) -> CoreResult<Degradable<MediaMetadata>> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.records).get(path) {
            Some(Ok(record)) => Ok(record.clone().map(|metadata| match tier {
                MetadataTier::Basic => metadata.to_basic(),
                MetadataTier::Detailed => metadata,
            })),
            Some(Err(reason)) => Err(CoreError::MetadataUnavailable {
                path: path.to_path_buf(),
                reason: reason.clone(),
            }),
            None => Err(CoreError::MetadataUnavailable {
                path: path.to_path_buf(),
                reason: format!("{}: no scripted record", self.kind),
            }),
        }
    }

    fn side_channel_rotation(&self, path: &Path) -> CoreResult<Option<Rotation>> {
        self.side_channel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.side_channel).get(path).copied())
    }
}
