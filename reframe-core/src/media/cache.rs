//! Fingerprint-keyed metadata cache.
//!
//! Entries are keyed by file name, size, modification time and requested
//! tier. The key is a fingerprint, not a content hash: two different files
//! sharing all three attributes collide, which is accepted for a cache whose
//! only job is to skip a probe.
//!
//! The cache is constructed explicitly by the composition root and shared
//! through `Arc`. Reads take a shared lock, inserts an exclusive one. When a
//! TTL is configured it is enforced on lookup and by `purge_expired`.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant, UNIX_EPOCH};

use super::{MediaMetadata, MetadataTier};
use crate::error::{CoreError, CoreResult};

/// Cache key derived from file attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file_name: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch, 0 if unavailable.
    pub modified_nanos: u128,
    pub tier: MetadataTier,
}

impl CacheKey {
    /// Fingerprints the file at `path` for the given tier.
    pub fn for_path(path: &Path, tier: MetadataTier) -> CoreResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(path.to_path_buf())
            } else {
                CoreError::Io(e)
            }
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CoreError::PathError(format!("no file name in {}", path.display())))?;

        let modified_nanos = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());

        Ok(Self {
            file_name,
            size: metadata.len(),
            modified_nanos,
            tier,
        })
    }

    /// Same file, different tier.
    pub fn with_tier(&self, tier: MetadataTier) -> Self {
        Self {
            tier,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: Map<String, Value>,
    inserted_at: Instant,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Hook for recording metadata of files the system produced itself.
pub trait MetadataWriteBack: Send + Sync {
    fn record(&self, path: &Path, metadata: &MediaMetadata);
}

/// In-memory metadata store shared by all per-item pipelines.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    /// Cache whose entries live for the lifetime of the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose entries expire `ttl` after insertion.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl)
    }

    /// Looks up a record. Expired or undecodable entries count as misses.
    pub fn get(&self, key: &CacheKey) -> Option<MediaMetadata> {
        let found = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(key)
                .filter(|entry| !self.is_expired(entry))
                .map(|entry| MediaMetadata::from_map(&entry.record))
        };

        match found {
            Some(Ok(metadata)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(metadata)
            }
            Some(Err(e)) => {
                log::warn!("Dropping undecodable cache entry for {}: {}", key.file_name, e);
                self.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a record, replacing any previous entry for the key.
    pub fn insert(&self, key: CacheKey, metadata: &MediaMetadata) {
        let record = match metadata.to_map() {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Not caching metadata for {}: {}", key.file_name, e);
                return;
            }
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                record,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry));
        let purged = before - entries.len();
        if purged > 0 {
            log::debug!("Purged {} expired metadata cache entries", purged);
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl MetadataWriteBack for MetadataCache {
    fn record(&self, path: &Path, metadata: &MediaMetadata) {
        match CacheKey::for_path(path, metadata.tier()) {
            Ok(key) => {
                log::debug!("Caching post-transform metadata for {}", path.display());
                self.insert(key, metadata);
            }
            Err(e) => log::warn!(
                "Could not fingerprint produced file {}: {}",
                path.display(),
                e
            ),
        }
    }
}
