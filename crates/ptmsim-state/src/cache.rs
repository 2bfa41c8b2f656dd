//! Bounded cache of uploaded constants, keyed by content.

use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::backend::ConstantData;
use crate::error::StateResult;

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that required an upload.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Entries currently held.
    pub len: usize,
    /// Maximum number of entries.
    pub capacity: usize,
}

/// Least-recently-used map from constant contents to backend handles.
#[derive(Debug, Clone)]
pub struct ConstantCache<C> {
    entries: FxHashMap<ConstantData, (C, u64)>,
    capacity: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<C: Clone> ConstantCache<C> {
    /// An empty cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        ConstantCache {
            entries: FxHashMap::default(),
            capacity: capacity.max(1),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// The handle for `data`, uploading it on a miss.
    pub fn get_or_upload<F>(&mut self, data: ConstantData, upload: F) -> StateResult<C>
    where
        F: FnOnce(&ConstantData) -> StateResult<C>,
    {
        self.tick += 1;
        if let Some((handle, last_used)) = self.entries.get_mut(&data) {
            *last_used = self.tick;
            self.hits += 1;
            trace!(len = data.len(), "constant cache hit");
            return Ok(handle.clone());
        }

        self.misses += 1;
        trace!(len = data.len(), bytes = data.size_bytes(), "constant cache miss");
        let handle = upload(&data)?;

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(data, (handle.clone(), self.tick));
        Ok(handle)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, last_used))| *last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.evictions += 1;
            warn!(
                capacity = self.capacity,
                evicted_len = key.len(),
                "constant cache full, evicting least recently used entry"
            );
        }
    }

    /// Drop every entry; counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.entries.len(),
            capacity: self.capacity,
        }
    }
}
