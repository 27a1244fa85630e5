//! The metadata backend seam.
//!
//! Both probing tools answer the same question with different argument
//! templates and JSON schemas. Each backend turns its tool's answer into a
//! `MediaMetadata` with an already-normalized rotation.

use std::fmt;
use std::path::Path;

use crate::error::CoreResult;
use crate::media::{Degradable, MediaMetadata, MetadataTier, Rotation};

/// Which external tool a backend wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// ffprobe-style stream probing.
    Probe,
    /// mediainfo-style track inspection.
    Inspection,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Probe => write!(f, "ffprobe"),
            BackendKind::Inspection => write!(f, "mediainfo"),
        }
    }
}

/// A source of normalized metadata records.
pub trait MetadataBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Lightweight availability probe. Must finish within the availability timeout.
    fn is_available(&self) -> bool;

    /// Probes `path`. Non-zero exits and malformed output are errors here;
    /// the extractor decides how to degrade. A record whose fields were
    /// present but unusable (an unparsable rotation) comes back `Degraded`.
    fn probe(&self, path: &Path, tier: MetadataTier) -> CoreResult<Degradable<MediaMetadata>>;

    /// Rotation carried in container side data (display matrix), if the
    /// backend can read it. `Ok(None)` when absent or unsupported.
    fn side_channel_rotation(&self, _path: &Path) -> CoreResult<Option<Rotation>> {
        Ok(None)
    }
}
