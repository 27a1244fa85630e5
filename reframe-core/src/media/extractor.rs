// ============================================================================
// reframe-core/src/media/extractor.rs
// ============================================================================
//
// METADATA EXTRACTION: Backend Selection, Caching and Degradation
//
// Produces the canonical metadata record for a path:
//
// 1. Fail fast with `NotFound` when the path does not exist.
// 2. Serve from the cache when the fingerprint matches (a basic request may
//    be answered from a cached detailed record).
// 3. Otherwise ask the inspection backend (mediainfo) when its availability
//    probe succeeds, then the probe backend (ffprobe).
// 4. For containers that carry rotation in display-matrix side data, ask
//    the probe backend for it when the primary rotation reads 0.
// 5. Cache and return. When every backend fails, return a zero-valued
//    record wrapped in `Degradable::Degraded`. A backend record with an
//    unusable field (an unparsable rotation) is also returned `Degraded`
//    when no other backend does better. Degraded records are never cached.

use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

use super::cache::{CacheKey, MetadataCache};
use super::{Degradable, MediaKind, MediaMetadata, MetadataTier};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::external::{
    CommandRunner, FfprobeBackend, MediaInfoBackend, MetadataBackend,
};

/// Containers whose rotation may live only in display-matrix side data.
const DISPLAY_MATRIX_CONTAINERS: [&str; 4] = ["mov", "mp4", "m4v", "3gp"];

fn carries_display_matrix(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            DISPLAY_MATRIX_CONTAINERS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// A backend together with its memoized availability.
struct BackendSlot {
    backend: Arc<dyn MetadataBackend>,
    available: OnceCell<bool>,
}

impl BackendSlot {
    fn new(backend: Arc<dyn MetadataBackend>) -> Self {
        Self {
            backend,
            available: OnceCell::new(),
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = self.backend.is_available();
            log::debug!(
                "Metadata backend {}: {}",
                self.backend.kind(),
                if available { "available" } else { "unavailable" }
            );
            available
        })
    }
}

/// Orchestrates backends and the shared cache.
pub struct MetadataExtractor {
    cache: Arc<MetadataCache>,
    inspector: BackendSlot,
    prober: BackendSlot,
}

impl MetadataExtractor {
    /// Builds the mediainfo and ffprobe backends from `config`.
    pub fn new(
        cache: Arc<MetadataCache>,
        runner: Arc<dyn CommandRunner>,
        config: &CoreConfig,
    ) -> Self {
        let inspector = MediaInfoBackend::new(
            Arc::clone(&runner),
            config.mediainfo_path.clone(),
            config.probe_timeout,
            config.availability_timeout,
        );
        let prober = FfprobeBackend::new(
            runner,
            config.ffprobe_path.clone(),
            config.probe_timeout,
            config.availability_timeout,
        );
        Self::with_backends(cache, Arc::new(inspector), Arc::new(prober))
    }

    /// Uses the given backends. `inspector` is preferred, `prober` also
    /// answers side-channel rotation queries.
    pub fn with_backends(
        cache: Arc<MetadataCache>,
        inspector: Arc<dyn MetadataBackend>,
        prober: Arc<dyn MetadataBackend>,
    ) -> Self {
        Self {
            cache,
            inspector: BackendSlot::new(inspector),
            prober: BackendSlot::new(prober),
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Dimensions, rotation, codec and duration.
    ///
    /// # Errors
    ///
    /// * `CoreError::NotFound` if `path` does not exist
    /// * `CoreError::InvalidInput` for unsupported extensions
    pub fn get_basic_metadata(&self, path: &Path) -> CoreResult<Degradable<MediaMetadata>> {
        self.extract(path, MetadataTier::Basic)
    }

    /// Basic fields plus stream details (frame rate, pixel format, audio).
    pub fn get_detailed_metadata(&self, path: &Path) -> CoreResult<Degradable<MediaMetadata>> {
        self.extract(path, MetadataTier::Detailed)
    }

    fn extract(&self, path: &Path, tier: MetadataTier) -> CoreResult<Degradable<MediaMetadata>> {
        if !path.exists() {
            return Err(CoreError::NotFound(path.to_path_buf()));
        }
        let kind = MediaKind::from_path(path).ok_or_else(|| {
            CoreError::InvalidInput(format!("unsupported media type: {}", path.display()))
        })?;

        let key = CacheKey::for_path(path, tier)?;
        if let Some(cached) = self.lookup_cached(&key) {
            log::debug!("Metadata cache hit ({}) for {}", tier, path.display());
            return Ok(Degradable::Ok(cached));
        }

        let probed = match self.probe_backends(path, tier) {
            Ok(probed) => probed,
            Err(reason) => {
                log::warn!(
                    "Metadata unavailable for {}: {}; using zero-valued record",
                    path.display(),
                    reason
                );
                return Ok(Degradable::Degraded {
                    value: MediaMetadata::unknown(kind),
                    reason,
                });
            }
        };
        let mut metadata = match probed {
            Degradable::Ok(metadata) => metadata,
            degraded @ Degradable::Degraded { .. } => {
                log::warn!(
                    "Metadata degraded for {}: {}",
                    path.display(),
                    degraded.reason().unwrap_or_default()
                );
                return Ok(degraded);
            }
        };

        if metadata.rotation.is_none() && carries_display_matrix(path) {
            self.widen_rotation(path, &mut metadata);
        }

        self.cache.insert(key, &metadata);
        Ok(Degradable::Ok(metadata))
    }

    fn lookup_cached(&self, key: &CacheKey) -> Option<MediaMetadata> {
        if let Some(hit) = self.cache.get(key) {
            return Some(hit);
        }
        match key.tier {
            MetadataTier::Basic => self
                .cache
                .get(&key.with_tier(MetadataTier::Detailed))
                .map(|detailed| detailed.to_basic()),
            MetadataTier::Detailed => None,
        }
    }

    /// Tries each available backend in preference order and returns the first
    /// clean record, else the first degraded one. The error string collects
    /// every backend's failure.
    fn probe_backends(
        &self,
        path: &Path,
        tier: MetadataTier,
    ) -> Result<Degradable<MediaMetadata>, String> {
        let mut failures = Vec::new();
        let mut degraded = None;
        for slot in [&self.inspector, &self.prober] {
            if !slot.is_available() {
                continue;
            }
            match slot.backend.probe(path, tier) {
                Ok(Degradable::Ok(metadata)) => {
                    log::debug!(
                        "{} metadata for {}: {}x{} {} rot {} ({:.2}s)",
                        slot.backend.kind(),
                        path.display(),
                        metadata.width,
                        metadata.height,
                        metadata.codec,
                        metadata.rotation,
                        metadata.duration
                    );
                    return Ok(Degradable::Ok(metadata));
                }
                Ok(Degradable::Degraded { value, reason }) => {
                    log::warn!("{} degraded for {}: {}", slot.backend.kind(), path.display(), reason);
                    let reason = format!("{}: {}", slot.backend.kind(), reason);
                    degraded.get_or_insert(Degradable::Degraded { value, reason });
                }
                Err(e) => {
                    log::warn!("{} failed for {}: {}", slot.backend.kind(), path.display(), e);
                    failures.push(format!("{}: {}", slot.backend.kind(), e));
                }
            }
        }
        if let Some(record) = degraded {
            Ok(record)
        } else if failures.is_empty() {
            Err("no metadata backend is available".to_string())
        } else {
            Err(failures.join("; "))
        }
    }

    fn widen_rotation(&self, path: &Path, metadata: &mut MediaMetadata) {
        if !self.prober.is_available() {
            return;
        }
        match self.prober.backend.side_channel_rotation(path) {
            Ok(Some(rotation)) if !rotation.is_none() => {
                log::info!(
                    "Display-matrix rotation {} found for {}",
                    rotation,
                    path.display()
                );
                metadata.rotation = rotation;
            }
            Ok(_) => {}
            Err(e) => log::debug!("Side-channel rotation lookup failed for {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::BackendKind;
    use crate::external::mocks::MockMetadataBackend;
    use crate::media::{DetailedMetadata, Rotation};
    use std::fs;
    use std::path::PathBuf;

    fn record(width: u32, height: u32, rotation: Rotation) -> MediaMetadata {
        MediaMetadata {
            width,
            height,
            rotation,
            codec: "h264".to_string(),
            duration: 4.0,
            kind: MediaKind::Video,
            detail: Some(DetailedMetadata {
                frame_rate: 30.0,
                ..DetailedMetadata::default()
            }),
        }
    }

    struct Setup {
        _dir: tempfile::TempDir,
        path: PathBuf,
        inspector: Arc<MockMetadataBackend>,
        prober: Arc<MockMetadataBackend>,
        extractor: MetadataExtractor,
    }

    fn setup(file_name: &str, inspector_available: bool) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(file_name);
        fs::write(&path, b"not really media").unwrap();
        let inspector = Arc::new(MockMetadataBackend::new(
            BackendKind::Inspection,
            inspector_available,
        ));
        let prober = Arc::new(MockMetadataBackend::new(BackendKind::Probe, true));
        let extractor = MetadataExtractor::with_backends(
            Arc::new(MetadataCache::new()),
            inspector.clone(),
            prober.clone(),
        );
        Setup {
            _dir: dir,
            path,
            inspector,
            prober,
            extractor,
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let s = setup("clip.mp4", true);
        let missing = s.path.with_file_name("gone.mp4");
        assert!(matches!(
            s.extractor.get_basic_metadata(&missing),
            Err(CoreError::NotFound(p)) if p == missing
        ));
        assert_eq!(s.inspector.probe_calls(), 0);
    }

    #[test]
    fn test_unsupported_extension_is_invalid_input() {
        let s = setup("notes.txt", true);
        let err = s.extractor.get_basic_metadata(&s.path).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_prefers_inspector_and_caches() {
        let s = setup("clip.mkv", true);
        s.inspector.expect_metadata(&s.path, record(1920, 1080, Rotation::Cw90));

        let first = s.extractor.get_basic_metadata(&s.path).unwrap();
        let second = s.extractor.get_basic_metadata(&s.path).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.value().rotation, Rotation::Cw90);
        assert!(first.value().detail.is_none());
        assert_eq!(s.inspector.probe_calls(), 1);
        assert_eq!(s.prober.probe_calls(), 0);
    }

    #[test]
    fn test_falls_back_to_prober_when_inspector_unavailable() {
        let s = setup("clip.mkv", false);
        s.prober.expect_metadata(&s.path, record(1280, 720, Rotation::None));

        let meta = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(meta.value().width, 1280);
        assert_eq!(s.inspector.probe_calls(), 0);
    }

    #[test]
    fn test_falls_back_to_prober_when_inspector_fails() {
        let s = setup("clip.mkv", true);
        s.inspector.expect_failure(&s.path, "malformed JSON");
        s.prober.expect_metadata(&s.path, record(640, 360, Rotation::None));

        let meta = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert!(!meta.is_degraded());
        assert_eq!(meta.value().height, 360);
    }

    #[test]
    fn test_all_backends_failing_degrades_without_caching() {
        let s = setup("clip.mkv", true);
        s.inspector.expect_failure(&s.path, "exit 1");
        s.prober.expect_failure(&s.path, "exit 1");

        let meta = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert!(meta.is_degraded());
        assert!(meta.value().has_unknown_dimensions());
        assert_eq!(meta.value().codec, "unknown");
        assert!(meta.reason().unwrap().contains("mediainfo"));
        assert!(s.extractor.cache().is_empty());

        s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(s.inspector.probe_calls(), 2);
    }

    #[test]
    fn test_degraded_record_is_returned_but_not_cached() {
        let s = setup("clip.mkv", true);
        s.inspector
            .expect_degraded(&s.path, record(1920, 1080, Rotation::None), "rotation value \"x\" is not numeric");
        s.prober.expect_failure(&s.path, "exit 1");

        let meta = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert!(meta.is_degraded());
        assert_eq!((meta.value().width, meta.value().height), (1920, 1080));
        assert!(meta.reason().unwrap().starts_with("mediainfo: rotation value"));
        assert!(s.extractor.cache().is_empty());
    }

    #[test]
    fn test_clean_prober_record_beats_degraded_inspector() {
        let s = setup("clip.mkv", true);
        s.inspector
            .expect_degraded(&s.path, record(1920, 1080, Rotation::None), "bad rotation");
        s.prober.expect_metadata(&s.path, record(1920, 1080, Rotation::Cw90));

        let meta = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert!(!meta.is_degraded());
        assert_eq!(meta.value().rotation, Rotation::Cw90);
        assert_eq!(s.extractor.cache().len(), 1);
    }

    #[test]
    fn test_basic_request_served_from_detailed_entry() {
        let s = setup("clip.mkv", true);
        s.inspector.expect_metadata(&s.path, record(1920, 1080, Rotation::None));

        let detailed = s.extractor.get_detailed_metadata(&s.path).unwrap();
        assert!(detailed.value().detail.is_some());
        let basic = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(basic.value(), &detailed.value().to_basic());
        assert_eq!(s.inspector.probe_calls(), 1);
    }

    #[test]
    fn test_side_channel_widens_zero_rotation_for_mov() {
        let s = setup("clip.MOV", true);
        s.inspector.expect_metadata(&s.path, record(1920, 1080, Rotation::None));
        s.prober.expect_side_channel_rotation(&s.path, Rotation::Cw270);

        let meta = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(meta.value().rotation, Rotation::Cw270);
        assert_eq!(s.prober.side_channel_calls(), 1);

        // Cached with the widened rotation.
        let again = s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(again.value().rotation, Rotation::Cw270);
        assert_eq!(s.prober.side_channel_calls(), 1);
    }

    #[test]
    fn test_side_channel_skipped_for_other_containers_and_nonzero_rotation() {
        let s = setup("clip.mkv", true);
        s.inspector.expect_metadata(&s.path, record(1920, 1080, Rotation::None));
        s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(s.prober.side_channel_calls(), 0);

        let s = setup("clip.mp4", true);
        s.inspector.expect_metadata(&s.path, record(1920, 1080, Rotation::Cw90));
        s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(s.prober.side_channel_calls(), 0);
    }

    #[test]
    fn test_changed_file_misses_cache() {
        let s = setup("clip.mkv", true);
        s.inspector.expect_metadata(&s.path, record(1920, 1080, Rotation::None));
        s.extractor.get_basic_metadata(&s.path).unwrap();

        fs::write(&s.path, b"different length content").unwrap();
        s.extractor.get_basic_metadata(&s.path).unwrap();
        assert_eq!(s.inspector.probe_calls(), 2);
    }
}
