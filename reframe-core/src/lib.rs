//! Core library for normalizing heterogeneous video clips and still images
//! to a target aspect profile using ffmpeg, ffprobe and mediainfo.
//!
//! This crate provides metadata extraction with caching, rotation
//! normalization, transform planning, filter-graph construction, encoder
//! selection and a hardware -> software -> stream copy execution engine.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use reframe_core::{CancellationToken, CoreConfig, Normalizer, find_processable_files};
//! use reframe_core::transform::TargetAspect;
//! use std::path::Path;
//!
//! let config = reframe_core::config::CoreConfigBuilder::new()
//!     .target(TargetAspect::Portrait.into())
//!     .parallel_jobs(2)
//!     .build();
//! let normalizer = Normalizer::from_config(config).unwrap();
//!
//! let files = find_processable_files(Path::new("/path/to/input")).unwrap();
//! let summary = normalizer
//!     .process_batch(&files, Path::new("/path/to/output"), &CancellationToken::new())
//!     .unwrap();
//! println!("{} processed, {} failed", summary.processed, summary.failed);
//! ```

pub mod config;
pub mod discovery;
pub mod encoding;
pub mod error;
pub mod external;
pub mod media;
pub mod pipeline;
pub mod temp_files;
pub mod transform;
pub mod utils;

// Re-exports for public API
pub use config::{CoreConfig, CoreConfigBuilder};
pub use discovery::find_processable_files;
pub use encoding::{CancellationToken, EncoderSelector, ExecutionEngine, ExecutionOutcome};
pub use error::{CoreError, CoreResult};
pub use media::{
    Degradable, MediaKind, MediaMetadata, MetadataCache, MetadataExtractor, MetadataTier, Rotation,
    normalize_rotation,
};
pub use pipeline::{BatchSummary, ItemReport, ItemStatus, NormalizeOutcome, Normalizer};
pub use transform::{FilterChain, FilterGraphBuilder, TransformPlan, TransformPlanner};
pub use utils::{format_bytes, format_duration, parse_ffmpeg_time};
