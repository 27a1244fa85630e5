// ============================================================================
// reframe-core/src/encoding/mod.rs
// ============================================================================
//
// ENCODING: Encoder Selection and the Tiered Execution Engine
//
// This module decides which encoders a clip is offered (hardware, software,
// stream copy), assembles the ffmpeg argument lists for each tier and runs
// them in strictly descending order until one produces a verified output.
//
// KEY COMPONENTS:
// - params: tiers, vendors, parameter sets and the bitrate triple
// - selector: encoder detection, functional tests and diagnostics
// - command: argument assembly per tier
// - progress: stderr/event scanning and the diagnostic tail
// - engine: the hardware -> software -> copy state machine

pub mod command;
pub mod engine;
pub mod params;
pub mod progress;
pub mod selector;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use command::{TranscodeSpec, build_transcode_command, transcode_args};
pub use engine::{ExecutionEngine, ExecutionJob, ExecutionOutcome, TierAttempt};
pub use params::{
    BitrateTriple, EncoderCandidate, EncoderChoice, EncoderParams, EncoderTier, EncodingSettings,
    HardwareSelection, HardwareVendor,
};
pub use progress::TranscodeMonitor;
pub use selector::{AvailableEncoders, DiagnosticReport, EncoderSelector, OptimalEncoder};

/// Cooperative cancellation flag shared between a caller and running jobs.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
