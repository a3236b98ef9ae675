use super::fingerprint::CacheKey;
use crate::core::config::{CacheCapacity, CacheConfig, ConfigValidatorExt};
use crate::core::errors::AdvisorError;
use crate::core::inference::ModelVersion;
use crate::core::tensor::TensorDescriptor;
use lru::LruCache;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// LRU cache of successful inference outputs.
///
/// Each operation takes the lock once for a short critical section. Values are
/// immutable shared slices, so a reader observes either the value before or
/// after a concurrent insert, never a partially written one.
#[derive(Debug)]
pub struct ResultCache {
    capacity: CacheCapacity,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<CacheKey, Arc<[TensorDescriptor]>>,
    bytes: usize,
}

fn entry_bytes(outputs: &[TensorDescriptor]) -> usize {
    outputs.iter().map(TensorDescriptor::byte_len).sum()
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Result<Self, AdvisorError> {
        let config = config.validated()?;
        Ok(Self {
            capacity: config.capacity,
            inner: RwLock::new(Inner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
        })
    }

    /// Returns the cached outputs for `key` and marks the entry most recently used.
    ///
    /// The entry is read under the shared lock, so misses never contend with
    /// each other. A hit then takes the exclusive lock briefly to promote the
    /// entry; if it was evicted in between, the promotion is a no-op.
    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<[TensorDescriptor]>> {
        let hit = self.inner.read().entries.peek(key).cloned()?;
        self.inner.write().entries.promote(key);
        Some(hit)
    }

    /// Inserts or overwrites an entry, evicting least recently used entries
    /// until the capacity bound holds again.
    ///
    /// Returns `false` if the outputs alone exceed a byte budget and were not cached.
    pub fn insert(&self, key: CacheKey, outputs: Arc<[TensorDescriptor]>) -> bool {
        let size = entry_bytes(&outputs);
        if let CacheCapacity::Bytes(budget) = self.capacity
            && size > budget
        {
            trace!(size, budget, "result larger than cache budget; not cached");
            return false;
        }

        let mut inner = self.inner.write();
        if let Some(previous) = inner.entries.put(key, outputs) {
            inner.bytes -= entry_bytes(&previous);
        }
        inner.bytes += size;

        loop {
            let over = match self.capacity {
                CacheCapacity::Entries(max) => inner.entries.len() > max,
                CacheCapacity::Bytes(max) => inner.bytes > max,
            };
            if !over {
                break;
            }
            match inner.entries.pop_lru() {
                Some((evicted, outputs)) => {
                    inner.bytes -= entry_bytes(&outputs);
                    trace!(version = %evicted.version, digest = ?evicted.digest, "evicted cache entry");
                }
                None => break,
            }
        }
        true
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of cached output buffers.
    pub fn bytes(&self) -> usize {
        self.inner.read().bytes
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.bytes = 0;
    }

    /// Drops every entry produced by `version`; returns how many were removed.
    pub fn invalidate_version(&self, version: &ModelVersion) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(key, _)| &key.version == version)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            if let Some(outputs) = inner.entries.pop(key) {
                inner.bytes -= entry_bytes(&outputs);
            }
        }
        stale.len()
    }
}
