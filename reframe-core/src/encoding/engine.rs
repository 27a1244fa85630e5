// ============================================================================
// reframe-core/src/encoding/engine.rs
// ============================================================================
//
// EXECUTION ENGINE: Hardware -> Software -> Copy Fallback
//
// Runs the candidates of an `EncoderChoice` in order until one succeeds.
// A tier succeeds only if ffmpeg exits with status zero AND its output
// exists AND is non-empty. Each tier writes to its own partial file, which
// is renamed onto the requested output only after that verification, so a
// caller never sees a partial or corrupt file.
//
// A killed process counts as a failed tier, except when the caller asked for
// cancellation: that aborts the whole chain with `CoreError::Cancelled`.

use ffmpeg_sidecar::event::FfmpegEvent;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::CancellationToken;
use super::command::{TranscodeSpec, build_transcode_command, transcode_args};
use super::params::{EncoderCandidate, EncoderChoice, EncoderTier, EncodingSettings};
use super::progress::TranscodeMonitor;
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegProcess, FfmpegSpawner};
use crate::media::cache::MetadataWriteBack;
use crate::media::{MediaMetadata, Rotation};
use crate::temp_files::create_partial_output;
use crate::transform::{FilterChain, TransformPlan};
use crate::utils::format_bytes;

/// Lower bound for a duration-derived transcode timeout.
pub const MIN_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything needed to run one item through the chain.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionJob<'a> {
    pub source: &'a Path,
    pub output: &'a Path,
    pub metadata: &'a MediaMetadata,
    pub plan: &'a TransformPlan,
    pub filters: &'a FilterChain,
    pub choice: &'a EncoderChoice,
}

/// Record of one tier attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TierAttempt {
    pub tier: EncoderTier,
    pub encoder: String,
    pub args: Vec<String>,
    /// `None` for the attempt that succeeded.
    pub error: Option<String>,
}

/// Result of a successful `execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub output_path: PathBuf,
    pub tier: EncoderTier,
    pub encoder: String,
    pub attempts: Vec<TierAttempt>,
    /// Size of the verified output.
    pub output_bytes: u64,
    /// Metadata of the produced file as far as the engine knows it.
    pub metadata: MediaMetadata,
}

impl ExecutionOutcome {
    /// The plan was fully applied (any tier but stream copy).
    pub fn met_plan(&self) -> bool {
        self.tier != EncoderTier::Copy
    }
}

/// Why a single tier did not produce an output.
enum TierError {
    /// Caller cancellation; aborts the chain.
    Cancelled,
    /// Any other failure; the next tier is tried.
    Failed(CoreError, Vec<String>),
}

/// Runs encoder chains through an `FfmpegSpawner`.
pub struct ExecutionEngine<S: FfmpegSpawner> {
    spawner: S,
    ffmpeg_path: PathBuf,
    settings: EncodingSettings,
    timeout_factor: Option<f64>,
}

impl<S: FfmpegSpawner> ExecutionEngine<S> {
    pub fn new(spawner: S, ffmpeg_path: impl Into<PathBuf>, settings: EncodingSettings) -> Self {
        Self {
            spawner,
            ffmpeg_path: ffmpeg_path.into(),
            settings,
            timeout_factor: None,
        }
    }

    /// Limits each tier to `duration x factor` (at least one minute).
    /// `None` leaves transcodes unbounded.
    #[must_use]
    pub fn with_timeout_factor(mut self, factor: Option<f64>) -> Self {
        self.timeout_factor = factor.filter(|f| *f > 0.0);
        self
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Per-tier timeout for a source of `duration` seconds.
    pub fn transcode_timeout(&self, duration: f64) -> Option<Duration> {
        let factor = self.timeout_factor?;
        let secs = (duration.max(0.0) * factor).max(MIN_TRANSCODE_TIMEOUT.as_secs_f64());
        Some(Duration::from_secs_f64(secs))
    }

    /// Runs the job's candidates in order until one succeeds.
    ///
    /// On success the verified file is at `job.output` and, when a
    /// write-back hook is supplied, the post-transform metadata is recorded
    /// under the output's fingerprint.
    ///
    /// # Errors
    ///
    /// * `CoreError::Cancelled` if `cancel` fires; no further tier runs
    /// * `CoreError::AllTiersFailed` if every candidate failed
    pub fn execute(
        &self,
        job: &ExecutionJob<'_>,
        cancel: &CancellationToken,
        write_back: Option<&dyn MetadataWriteBack>,
    ) -> CoreResult<ExecutionOutcome> {
        let mut attempts = Vec::with_capacity(job.choice.candidates().len());
        let mut last_tail: Vec<String> = Vec::new();

        for candidate in job.choice.candidates() {
            let spec = TranscodeSpec {
                source: job.source,
                output: job.output,
                kind: job.metadata.kind,
                filters: job.filters,
                candidate,
                settings: &self.settings,
            };
            log::info!(
                "Trying {} tier ({}) for {}",
                candidate.tier,
                candidate.encoder,
                job.source.display()
            );

            match self.run_tier(job, &spec, cancel) {
                Ok(output_bytes) => {
                    attempts.push(TierAttempt {
                        tier: candidate.tier,
                        encoder: candidate.encoder.clone(),
                        args: transcode_args(&spec),
                        error: None,
                    });
                    let metadata = post_transform_metadata(job, candidate);
                    if let Some(hook) = write_back {
                        hook.record(job.output, &metadata);
                    }
                    if candidate.tier == EncoderTier::Copy {
                        log::warn!(
                            "{} was stream-copied; rotation, scaling and codec changes were not applied",
                            job.source.display()
                        );
                    }
                    log::info!(
                        "Wrote {} ({}) with {} ({} tier)",
                        job.output.display(),
                        format_bytes(output_bytes),
                        candidate.encoder,
                        candidate.tier
                    );
                    return Ok(ExecutionOutcome {
                        output_path: job.output.to_path_buf(),
                        tier: candidate.tier,
                        encoder: candidate.encoder.clone(),
                        attempts,
                        output_bytes,
                        metadata,
                    });
                }
                Err(TierError::Cancelled) => {
                    log::warn!("Cancelled while encoding {}", job.source.display());
                    return Err(CoreError::Cancelled);
                }
                Err(TierError::Failed(error, tail)) => {
                    let error = CoreError::EncodeFailed {
                        tier: candidate.tier,
                        message: error.to_string(),
                    };
                    log::warn!("{}: {}", job.source.display(), error);
                    attempts.push(TierAttempt {
                        tier: candidate.tier,
                        encoder: candidate.encoder.clone(),
                        args: transcode_args(&spec),
                        error: Some(error.to_string()),
                    });
                    if !tail.is_empty() {
                        last_tail = tail;
                    }
                }
            }
        }

        let last_error = attempts
            .last()
            .and_then(|attempt| attempt.error.clone())
            .unwrap_or_else(|| "no encoder candidates".to_string());
        log::error!(
            "All encoder tiers failed for {}: {}",
            job.source.display(),
            last_error
        );
        for line in &last_tail {
            log::error!("  {line}");
        }
        Err(CoreError::AllTiersFailed {
            path: job.source.to_path_buf(),
            attempts: attempts.len(),
            last_error,
        })
    }

    fn run_tier(
        &self,
        job: &ExecutionJob<'_>,
        spec: &TranscodeSpec<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TierError> {
        if cancel.is_cancelled() {
            return Err(TierError::Cancelled);
        }

        let partial = create_partial_output(job.output)
            .map_err(|e| TierError::Failed(e, Vec::new()))?;
        let partial_spec = TranscodeSpec {
            output: &partial,
            ..*spec
        };
        let command = build_transcode_command(&self.ffmpeg_path, &partial_spec);

        let mut process = self
            .spawner
            .spawn(command)
            .map_err(|e| TierError::Failed(e, Vec::new()))?;

        let label = job
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.source.display().to_string());
        let mut monitor = TranscodeMonitor::new(label, Some(job.metadata.duration));
        let timeout = self.transcode_timeout(job.metadata.duration);

        let streamed = process.handle_events(|event: FfmpegEvent| {
            monitor.handle_event(&event);
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if let Some(limit) = timeout {
                if monitor.elapsed() > limit {
                    return Err(CoreError::CommandTimeout(spec.candidate.encoder.clone(), limit));
                }
            }
            Ok(())
        });

        let stop_reason = match streamed {
            Err(e) => Some(e),
            Ok(()) if cancel.is_cancelled() => Some(CoreError::Cancelled),
            Ok(()) => None,
        };
        if let Some(reason) = stop_reason {
            if let Err(e) = process.kill() {
                log::warn!("Failed to kill ffmpeg: {}", e);
            }
            if let Err(e) = process.wait() {
                log::debug!("Wait after kill failed: {}", e);
            }
            return Err(match reason {
                CoreError::Cancelled => TierError::Cancelled,
                other => TierError::Failed(other, monitor.diagnostic_tail()),
            });
        }

        let status = process
            .wait()
            .map_err(|e| TierError::Failed(e, monitor.diagnostic_tail()))?;
        if !status.success() {
            return Err(TierError::Failed(
                CoreError::CommandFailed(
                    spec.candidate.encoder.clone(),
                    status,
                    monitor.failure_summary(),
                ),
                monitor.diagnostic_tail(),
            ));
        }

        let size = std::fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(TierError::Failed(
                CoreError::InvalidInput(format!(
                    "{} exited successfully but produced an empty output",
                    spec.candidate.encoder
                )),
                monitor.diagnostic_tail(),
            ));
        }

        partial
            .persist(job.output)
            .map_err(|e| TierError::Failed(CoreError::Io(e.error), Vec::new()))?;
        log::debug!(
            "{} tier finished in {:.1}s",
            spec.candidate.tier,
            monitor.elapsed().as_secs_f64()
        );
        Ok(size)
    }
}

/// What is known about the produced file without probing it.
///
/// Encoded outputs are upright, at the planned size and in the candidate's
/// codec. Stream copies keep the source's basic record.
fn post_transform_metadata(job: &ExecutionJob<'_>, candidate: &EncoderCandidate) -> MediaMetadata {
    let Some(codec) = candidate.output_codec() else {
        return job.metadata.to_basic();
    };
    let (width, height) = if job.plan.needs_scaling {
        (job.plan.target_width, job.plan.target_height)
    } else {
        (job.plan.effective_width, job.plan.effective_height)
    };
    MediaMetadata {
        width,
        height,
        rotation: Rotation::None,
        codec: codec.to_string(),
        duration: job.metadata.duration,
        kind: job.metadata.kind,
        detail: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::params::{HardwareSelection, HardwareVendor};
    use crate::external::mocks::{MockFfmpegProcess, MockFfmpegSpawner};
    use crate::media::MediaKind;
    use crate::transform::{FilterGraphBuilder, TargetAspect, TransformPlanner};

    struct Fixture {
        metadata: MediaMetadata,
        plan: TransformPlan,
        filters: FilterChain,
        choice: EncoderChoice,
    }

    fn fixture() -> Fixture {
        let metadata = MediaMetadata {
            width: 1920,
            height: 1080,
            rotation: Rotation::Cw90,
            codec: "hevc".to_string(),
            duration: 30.0,
            kind: MediaKind::Video,
            detail: None,
        };
        let plan = TransformPlanner::default().plan(&metadata, &TargetAspect::Portrait.into());
        let filters = FilterGraphBuilder::new().build(&metadata, &plan);
        let choice = EncoderChoice::for_plan(
            &plan,
            &metadata.codec,
            Some(HardwareSelection {
                vendor: HardwareVendor::Nvidia,
                simplified: false,
            }),
            &EncodingSettings::default(),
        );
        Fixture {
            metadata,
            plan,
            filters,
            choice,
        }
    }

    fn engine(spawner: &MockFfmpegSpawner) -> ExecutionEngine<MockFfmpegSpawner> {
        ExecutionEngine::new(spawner.clone(), "ffmpeg", EncodingSettings::default())
    }

    #[test]
    fn test_timeout_scales_with_duration() {
        let spawner = MockFfmpegSpawner::new();
        let unbounded = engine(&spawner);
        assert_eq!(unbounded.transcode_timeout(100.0), None);

        let bounded = engine(&spawner).with_timeout_factor(Some(3.0));
        assert_eq!(bounded.transcode_timeout(100.0), Some(Duration::from_secs(300)));
        assert_eq!(bounded.transcode_timeout(1.0), Some(MIN_TRANSCODE_TIMEOUT));
    }

    #[test]
    fn test_hardware_success_writes_output() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("out").join("clip.mp4");
        let fx = fixture();

        let spawner = MockFfmpegSpawner::new();
        spawner.add_success_expectation("h264_nvenc", vec![]);

        let job = ExecutionJob {
            source: &source,
            output: &output,
            metadata: &fx.metadata,
            plan: &fx.plan,
            filters: &fx.filters,
            choice: &fx.choice,
        };
        let outcome = engine(&spawner).execute(&job, &CancellationToken::new(), None)?;

        assert_eq!(outcome.tier, EncoderTier::Hardware);
        assert_eq!(outcome.output_path, output);
        assert!(outcome.output_bytes > 0);
        assert_eq!(std::fs::metadata(&output)?.len(), outcome.output_bytes);
        assert_eq!(outcome.metadata.rotation, Rotation::None);
        assert_eq!((outcome.metadata.width, outcome.metadata.height), (1080, 1920));
        assert_eq!(outcome.metadata.codec, "h264");
        Ok(())
    }

    #[test]
    fn test_exit_zero_without_output_is_a_failure() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("clip.mp4");
        let fx = fixture();

        let spawner = MockFfmpegSpawner::new();
        // Exit 0 but the partial stays empty.
        spawner.add_expectation("h264_nvenc", Ok(MockFfmpegProcess::new(vec![], 0)), false);
        spawner.add_success_expectation("libx264", vec![]);

        let job = ExecutionJob {
            source: &source,
            output: &output,
            metadata: &fx.metadata,
            plan: &fx.plan,
            filters: &fx.filters,
            choice: &fx.choice,
        };
        let outcome = engine(&spawner).execute(&job, &CancellationToken::new(), None)?;
        assert_eq!(outcome.tier, EncoderTier::Software);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0].error.is_some());
        Ok(())
    }

    #[test]
    fn test_failed_partials_are_cleaned_up() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("clip.mp4");
        let fx = fixture();

        let spawner = MockFfmpegSpawner::new();
        spawner.add_exit_error_expectation("h264_nvenc", vec![], 1);
        spawner.add_exit_error_expectation("libx264", vec![], 1);
        spawner.add_exit_error_expectation("copy", vec![], 1);

        let job = ExecutionJob {
            source: &source,
            output: &output,
            metadata: &fx.metadata,
            plan: &fx.plan,
            filters: &fx.filters,
            choice: &fx.choice,
        };
        let result = engine(&spawner).execute(&job, &CancellationToken::new(), None);
        assert!(matches!(
            result,
            Err(CoreError::AllTiersFailed { attempts: 3, .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_cancel_before_start_runs_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("clip.mp4");
        let fx = fixture();

        let spawner = MockFfmpegSpawner::new();
        let token = CancellationToken::new();
        token.cancel();

        let job = ExecutionJob {
            source: &source,
            output: &output,
            metadata: &fx.metadata,
            plan: &fx.plan,
            filters: &fx.filters,
            choice: &fx.choice,
        };
        let result = engine(&spawner).execute(&job, &token, None);
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(spawner.get_received_calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_copy_outcome_keeps_source_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("clip.mp4");
        let fx = fixture();

        let spawner = MockFfmpegSpawner::new();
        spawner.add_spawn_error_expectation(
            "h264_nvenc",
            CoreError::DependencyNotFound("ffmpeg".to_string()),
        );
        spawner.add_exit_error_expectation("libx264", vec![], 187);
        spawner.add_success_expectation("copy", vec![]);

        let job = ExecutionJob {
            source: &source,
            output: &output,
            metadata: &fx.metadata,
            plan: &fx.plan,
            filters: &fx.filters,
            choice: &fx.choice,
        };
        let outcome = engine(&spawner).execute(&job, &CancellationToken::new(), None)?;
        assert_eq!(outcome.tier, EncoderTier::Copy);
        assert!(!outcome.met_plan());
        assert_eq!(outcome.metadata.rotation, Rotation::Cw90);
        assert_eq!(outcome.metadata.codec, "hevc");
        Ok(())
    }
}
