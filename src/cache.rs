//! In-memory buffer cache for whole resources
//!
//! Entries are keyed by resource path and remember the validators observed
//! when they were filled. An entry is only served while those validators
//! still match the provider's current metadata; anything else is stale and
//! gets replaced by the next fill.
//!
//! Two independent ceilings bound the cache: total bytes held and number of
//! entries. Inserting evicts least recently read entries until both hold.
//! Entries are immutable once inserted: a refresh swaps in a new
//! `Arc<CacheEntry>` rather than editing the buffer.

use crate::models::ResourceMetadata;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Capacity limits for a [`BufferCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Maximum total bytes across all entries
    pub max_bytes: u64,
    /// Resources larger than this are never cached
    pub max_entry_size: u64,
    /// Entries older than this are treated as stale
    pub max_age: Option<Duration>,
}

impl Default for CacheLimits {
    fn default() -> Self {
        CacheLimits {
            max_entries: 1000,
            max_bytes: 64 * 1024 * 1024,
            max_entry_size: 1024 * 1024,
            max_age: None,
        }
    }
}

struct CacheEntry {
    data: Bytes,
    metadata: ResourceMetadata,
    inserted_at: Instant,
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn is_fresh(&self, current: &ResourceMetadata, max_age: Option<Duration>) -> bool {
        if !self.metadata.same_version(current) {
            return false;
        }
        match max_age {
            Some(max_age) => self.inserted_at.elapsed() <= max_age,
            None => true,
        }
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Default)]
struct CacheTable {
    entries: HashMap<String, Arc<CacheEntry>>,
    total_bytes: u64,
}

impl CacheTable {
    fn remove(&mut self, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size());
        Some(entry)
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone())
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Fresh entry, the complete resource buffer
    Hit(Bytes),
    /// An entry exists but describes another content version or expired
    Stale,
    Miss,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub evictions: u64,
    /// Resources streamed straight through because they exceed the limits
    pub bypassed: u64,
}

impl CacheStats {
    /// Hit rate as a percentage of lookups
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses + self.stale;
        if lookups == 0 {
            0.0
        } else {
            (self.hits as f64 / lookups as f64) * 100.0
        }
    }
}

/// Process-wide table of whole-resource byte buffers
pub struct BufferCache {
    table: RwLock<CacheTable>,
    limits: CacheLimits,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    evictions: AtomicU64,
    bypassed: AtomicU64,
}

impl BufferCache {
    pub fn new(limits: CacheLimits) -> Self {
        BufferCache {
            table: RwLock::new(CacheTable::default()),
            limits,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    /// Whether a resource of `length` bytes may be cached at all
    pub fn admits(&self, length: u64) -> bool {
        self.limits.max_entries > 0
            && length <= self.limits.max_entry_size
            && length <= self.limits.max_bytes
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up the buffer for `key`, checking it against `current` metadata
    ///
    /// Takes the read lock only; a hit refreshes the entry's LRU position
    /// through an atomic tick.
    pub fn lookup(&self, key: &str, current: &ResourceMetadata) -> CacheLookup {
        let table = self.table.read();
        let Some(entry) = table.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache miss: key={}", key);
            return CacheLookup::Miss;
        };

        if !entry.is_fresh(current, self.limits.max_age) {
            self.stale.fetch_add(1, Ordering::Relaxed);
            debug!("Cache entry stale: key={}", key);
            return CacheLookup::Stale;
        }

        entry.last_accessed.store(self.tick(), Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!("Cache hit: key={}, size={}", key, entry.data.len());
        CacheLookup::Hit(entry.data.clone())
    }

    /// Store the complete buffer for `key`, replacing any previous entry
    ///
    /// Returns `false` without storing when the buffer exceeds the per-entry
    /// or total byte limits.
    pub fn insert(&self, key: &str, metadata: ResourceMetadata, data: Bytes) -> bool {
        let size = data.len() as u64;
        if !self.admits(size) {
            self.record_bypass();
            debug!("Not caching oversized resource: key={}, size={}", key, size);
            return false;
        }

        let entry = Arc::new(CacheEntry {
            data,
            metadata,
            inserted_at: Instant::now(),
            last_accessed: AtomicU64::new(self.tick()),
        });

        let mut table = self.table.write();
        table.remove(key);

        let mut evicted = 0u64;
        while table.entries.len() + 1 > self.limits.max_entries
            || table.total_bytes + size > self.limits.max_bytes
        {
            let Some(victim) = table.least_recently_used() else {
                break;
            };
            table.remove(&victim);
            evicted += 1;
            debug!("Evicted cache entry: key={}", victim);
        }

        table.total_bytes += size;
        table.entries.insert(key.to_string(), entry);

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        debug!(
            "Cached resource: key={}, size={}, entries={}, total_bytes={}",
            key,
            size,
            table.entries.len(),
            table.total_bytes
        );
        true
    }

    /// Drop the entry for `key` if it no longer matches `current`
    pub fn invalidate_if_stale(&self, key: &str, current: &ResourceMetadata) -> bool {
        {
            let table = self.table.read();
            match table.entries.get(key) {
                Some(entry) if !entry.is_fresh(current, self.limits.max_age) => {}
                _ => return false,
            }
        }

        let mut table = self.table.write();
        // Re-check under the write lock: a concurrent fill may have replaced it.
        let still_stale = table
            .entries
            .get(key)
            .map(|entry| !entry.is_fresh(current, self.limits.max_age))
            .unwrap_or(false);
        if still_stale {
            table.remove(key);
            debug!("Dropped stale cache entry: key={}", key);
        }
        still_stale
    }

    /// Remove the entry for `key`
    pub fn invalidate(&self, key: &str) -> bool {
        self.table.write().remove(key).is_some()
    }

    /// Remove every entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut table = self.table.write();
        let count = table.entries.len();
        table.entries.clear();
        table.total_bytes = 0;
        count
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.read().entries.contains_key(key)
    }

    pub fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.table.read();
        CacheStats {
            total_entries: table.entries.len(),
            total_bytes: table.total_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
        }
    }
}
