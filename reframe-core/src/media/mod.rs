// ============================================================================
// reframe-core/src/media/mod.rs
// ============================================================================
//
// MEDIA: Metadata Records, Rotation, Cache and Extraction
//
// This module owns the canonical metadata record that everything downstream
// consumes. The record is strongly typed; it is only flattened into a JSON
// map at the cache boundary (`to_map` / `from_map`).
//
// KEY COMPONENTS:
// - MediaMetadata / DetailedMetadata: the typed record (basic + detailed tier)
// - Degradable: result wrapper separating real values from zero-valued fallbacks
// - rotation: raw angle -> {0, 90, 180, 270}
// - cache: fingerprint-keyed, TTL-aware in-memory store
// - extractor: backend selection, cache lookups and the side-channel pass

pub mod cache;
pub mod extractor;
pub mod rotation;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
pub use cache::{CacheKey, CacheStats, MetadataCache, MetadataWriteBack};
pub use extractor::MetadataExtractor;
pub use rotation::{Rotation, normalize_rotation, normalize_rotation_value};

/// Codec identifier used when a backend cannot name the stream's codec.
pub const UNKNOWN_CODEC: &str = "unknown";

/// Aspect window treated as standard 16:9 landscape.
const STANDARD_LANDSCAPE_MIN: f64 = 1.7;
const STANDARD_LANDSCAPE_MAX: f64 = 1.8;

/// Either dimension at or above this counts as 4K.
const UHD_DIMENSION: u32 = 3840;

// ============================================================================
// DEGRADABLE RESULTS
// ============================================================================

/// A value that may have been replaced by a fallback.
///
/// `Degraded` carries the zero/default value that was substituted and the
/// reason, so callers can retry, skip or accept it.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradable<T> {
    Ok(T),
    Degraded { value: T, reason: String },
}

impl<T> Degradable<T> {
    pub fn value(&self) -> &T {
        match self {
            Degradable::Ok(value) | Degradable::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Degradable::Ok(value) | Degradable::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Degradable::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Degradable::Ok(_) => None,
            Degradable::Degraded { reason, .. } => Some(reason),
        }
    }

    /// Applies `f` to the value, keeping any degradation reason.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Degradable<U> {
        match self {
            Degradable::Ok(value) => Degradable::Ok(f(value)),
            Degradable::Degraded { value, reason } => Degradable::Degraded {
                value: f(value),
                reason,
            },
        }
    }

    /// Converts into a `Result`, turning a degraded value into an error.
    pub fn ok_or_else<E>(self, err: impl FnOnce(String) -> E) -> Result<T, E> {
        match self {
            Degradable::Ok(value) => Ok(value),
            Degradable::Degraded { reason, .. } => Err(err(reason)),
        }
    }
}

// ============================================================================
// MEDIA KINDS AND TIERS
// ============================================================================

/// Broad category of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Classifies a path by extension. `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "mov" | "m4v" | "mkv" | "avi" | "webm" | "3gp" => Some(MediaKind::Video),
            "jpg" | "jpeg" | "png" => Some(MediaKind::Image),
            _ => None,
        }
    }
}

/// How much metadata is requested. Part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataTier {
    Basic,
    Detailed,
}

impl fmt::Display for MetadataTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataTier::Basic => write!(f, "basic"),
            MetadataTier::Detailed => write!(f, "detailed"),
        }
    }
}

// ============================================================================
// METADATA RECORD
// ============================================================================

/// Canonical metadata for one media file.
///
/// `width`/`height` are as stored in the stream; 0 means unknown.
/// `rotation` is always normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub codec: String,
    pub duration: f64,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailedMetadata>,
}

/// Fields only filled by a detailed probe.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailedMetadata {
    pub frame_rate: f64,
    pub bit_depth: Option<u32>,
    pub color_space: Option<String>,
    pub pixel_format: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: u32,
    pub audio_sample_rate: u32,
    pub audio_duration: f64,
}

impl MediaMetadata {
    /// Zero-valued record returned when no backend could describe the file.
    pub fn unknown(kind: MediaKind) -> Self {
        Self {
            width: 0,
            height: 0,
            rotation: Rotation::None,
            codec: UNKNOWN_CODEC.to_string(),
            duration: 0.0,
            kind,
            detail: None,
        }
    }

    pub fn tier(&self) -> MetadataTier {
        if self.detail.is_some() {
            MetadataTier::Detailed
        } else {
            MetadataTier::Basic
        }
    }

    /// Copy of the record without the detailed fields.
    pub fn to_basic(&self) -> Self {
        Self {
            detail: None,
            ..self.clone()
        }
    }

    /// True when either dimension is unknown.
    pub fn has_unknown_dimensions(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn effective_width(&self) -> u32 {
        if self.rotation.is_quarter_turn() {
            self.height
        } else {
            self.width
        }
    }

    pub fn effective_height(&self) -> u32 {
        if self.rotation.is_quarter_turn() {
            self.width
        } else {
            self.height
        }
    }

    pub fn is_portrait(&self) -> bool {
        self.effective_height() > self.effective_width()
    }

    /// Stored (pre-rotation) width / height. 0.0 when height is unknown.
    pub fn aspect_ratio(&self) -> f64 {
        ratio(self.width, self.height)
    }

    pub fn is_4k(&self) -> bool {
        self.width >= UHD_DIMENSION || self.height >= UHD_DIMENSION
    }

    pub fn is_hevc(&self) -> bool {
        matches!(self.codec.as_str(), "hevc" | "h265")
    }

    /// Stored frame is roughly 16:9 landscape.
    pub fn is_standard_landscape(&self) -> bool {
        let aspect = self.aspect_ratio();
        aspect > STANDARD_LANDSCAPE_MIN && aspect < STANDARD_LANDSCAPE_MAX
    }

    // ---- Serialization boundary ----

    /// Flattens the record into a JSON object for cache storage.
    pub fn to_map(&self) -> CoreResult<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(CoreError::JsonParse(format!(
                "metadata serialized to non-object value: {other}"
            ))),
            Err(e) => Err(CoreError::JsonParse(e.to_string())),
        }
    }

    /// Rebuilds a record from a cache map, re-validating the rotation.
    pub fn from_map(map: &Map<String, Value>) -> CoreResult<Self> {
        serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| CoreError::JsonParse(format!("invalid cached metadata: {e}")))
    }
}

pub(crate) fn ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        0.0
    } else {
        f64::from(width) / f64::from(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(width: u32, height: u32, rotation: Rotation, codec: &str) -> MediaMetadata {
        MediaMetadata {
            width,
            height,
            rotation,
            codec: codec.to_string(),
            duration: 12.5,
            kind: MediaKind::Video,
            detail: None,
        }
    }

    #[test]
    fn test_effective_dimensions_follow_rotation() {
        for rotation in [Rotation::Cw90, Rotation::Cw270] {
            let meta = clip(1920, 1080, rotation, "h264");
            assert_eq!(meta.effective_width(), 1080);
            assert_eq!(meta.effective_height(), 1920);
            assert!(meta.is_portrait());
        }
        for rotation in [Rotation::None, Rotation::Cw180] {
            let meta = clip(1920, 1080, rotation, "h264");
            assert_eq!(meta.effective_width(), 1920);
            assert_eq!(meta.effective_height(), 1080);
            assert!(!meta.is_portrait());
        }
    }

    #[test]
    fn test_derived_flags() {
        let uhd = clip(3840, 2160, Rotation::None, "hevc");
        assert!(uhd.is_4k());
        assert!(uhd.is_hevc());
        assert!(uhd.is_standard_landscape());

        let tall_uhd = clip(2160, 3840, Rotation::None, "h264");
        assert!(tall_uhd.is_4k());
        assert!(!tall_uhd.is_standard_landscape());

        let four_three = clip(1440, 1080, Rotation::None, "h264");
        assert!(!four_three.is_4k());
        assert!(!four_three.is_standard_landscape());
    }

    #[test]
    fn test_unknown_record() {
        let meta = MediaMetadata::unknown(MediaKind::Video);
        assert!(meta.has_unknown_dimensions());
        assert_eq!(meta.codec, UNKNOWN_CODEC);
        assert_eq!(meta.aspect_ratio(), 0.0);
        assert!(!meta.is_portrait());
    }

    #[test]
    fn test_map_round_trip_keeps_detail() {
        let mut meta = clip(1080, 1920, Rotation::Cw90, "h264");
        meta.detail = Some(DetailedMetadata {
            frame_rate: 29.97,
            bit_depth: Some(8),
            pixel_format: Some("yuv420p".to_string()),
            audio_codec: Some("aac".to_string()),
            audio_channels: 2,
            audio_sample_rate: 48000,
            audio_duration: 12.4,
            ..Default::default()
        });

        let map = meta.to_map().unwrap();
        assert_eq!(map.get("rotation"), Some(&Value::from(90)));
        assert_eq!(MediaMetadata::from_map(&map).unwrap(), meta);
        assert_eq!(meta.tier(), MetadataTier::Detailed);
        assert_eq!(meta.to_basic().tier(), MetadataTier::Basic);
    }

    #[test]
    fn test_from_map_rejects_unnormalized_rotation() {
        let mut map = clip(640, 360, Rotation::None, "h264").to_map().unwrap();
        map.insert("rotation".to_string(), Value::from(45));
        assert!(matches!(
            MediaMetadata::from_map(&map),
            Err(CoreError::JsonParse(_))
        ));
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("a/clip.MOV")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("still.jpeg")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaKind::from_path(Path::new("no_extension")), None);
    }
}
