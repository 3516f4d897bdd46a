//! # Cache Layer
//!
//! Write-through, best-effort side cache in front of the primary store.
//!
//! The cached value of a record is a header-framed `Snapshot` of its whole
//! owned graph, keyed by the record's encoded key. Nothing here is needed
//! for correctness: every failure is either swallowed (`put`) or reported
//! to the caller as something to fall through on (`get`).

use crate::formats::{Snapshot, snapshot_from_bytes, snapshot_to_bytes};
use crate::primitives::DEFAULT_CACHE_CAPACITY;
use crate::record::Modelable;
use crate::MageError;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// A byte cache addressed by string keys.
pub trait Cache {
    /// Bytes stored under `key`; `MageError::CacheMiss` when absent.
    fn get(&self, key: &str) -> Result<Vec<u8>, MageError>;

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), MageError>;
}

// =============================================================================
// MEMORY CACHE
// =============================================================================

/// Bounded in-process LRU cache.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Cache holding at most `capacity` entries. A capacity of 0 is raised to 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether `key` is cached, without touching its recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Vec<u8>, MageError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| MageError::CacheMiss(key.to_string()))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), MageError> {
        self.entries.lock().put(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// CACHE LAYER
// =============================================================================

/// Snapshot-level access to a `Cache`.
#[derive(Debug, Default)]
pub struct CacheLayer<C> {
    inner: C,
}

impl<C: Cache> CacheLayer<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Cache a registered, keyed record. Never fails; problems are logged.
    pub fn put(&self, modelable: &dyn Modelable) {
        if let Err(e) = self.try_put(modelable) {
            tracing::warn!(
                kind = %modelable.record().kind_label(),
                error = %e,
                "cache write failed"
            );
        }
    }

    fn try_put(&self, modelable: &dyn Modelable) -> Result<(), MageError> {
        let snapshot = Snapshot::capture(modelable)?;
        let encoded = snapshot.key.encode();
        let bytes = snapshot_to_bytes(&snapshot)?;
        self.inner.set(&encoded, bytes)?;
        tracing::trace!(key = %snapshot.key, "cached record");
        Ok(())
    }

    /// Populate a registered, keyed record from the cache.
    ///
    /// Any error (including `CacheMiss`) means the caller should read from
    /// the primary store instead.
    pub fn get(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        let record = modelable.record();
        let key = record.key().cloned().ok_or_else(|| MageError::MissingKey {
            kind: record.kind_label(),
        })?;

        let bytes = self.inner.get(&key.encode())?;
        let snapshot = snapshot_from_bytes(&bytes)?;
        if snapshot.key != key {
            return Err(MageError::CacheError(format!(
                "cached snapshot for {} holds {}",
                key, snapshot.key
            )));
        }
        snapshot.restore(modelable)
    }
}
