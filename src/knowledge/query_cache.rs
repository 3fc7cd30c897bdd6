//! Query-level result cache with bulk eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::engine::ScoredChunk;
use crate::constants::QUERY_CACHE_EVICT_FRACTION;

struct CachedResults {
    results: Arc<Vec<ScoredChunk>>,
    inserted_at: Instant,
}

/// TTL- and capacity-bound map of `(query, top_k)` digests to result sets.
///
/// Once the cache grows past capacity it first drops expired entries; if none
/// have expired it drops the oldest fifth by insertion time in one pass.
pub struct QueryCache {
    entries: Mutex<HashMap<[u8; 32], CachedResults>>,
    ttl: Duration,
    capacity: usize,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl QueryCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    pub fn get(&self, key: &[u8; 32]) -> Option<Arc<Vec<ScoredChunk>>> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &[u8; 32], now: Instant) -> Option<Arc<Vec<ScoredChunk>>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(Arc::clone(&entry.results))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Caches `results`. Empty result sets are never stored.
    pub fn insert(&self, key: [u8; 32], results: Vec<ScoredChunk>) {
        self.insert_at(key, results, Instant::now());
    }

    pub(crate) fn insert_at(&self, key: [u8; 32], results: Vec<ScoredChunk>, now: Instant) {
        if results.is_empty() {
            return;
        }

        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CachedResults {
                results: Arc::new(results),
                inserted_at: now,
            },
        );

        if entries.len() > self.capacity {
            self.evict(&mut entries, now);
        }
    }

    fn evict(&self, entries: &mut HashMap<[u8; 32], CachedResults>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);

        if entries.len() == before {
            let batch = ((self.capacity as f64) * QUERY_CACHE_EVICT_FRACTION) as usize;
            let batch = batch.max(1);

            let mut by_age: Vec<([u8; 32], Instant)> =
                entries.iter().map(|(k, v)| (*k, v.inserted_at)).collect();
            by_age.sort_by_key(|(_, inserted)| *inserted);

            for (key, _) in by_age.into_iter().take(batch) {
                entries.remove(&key);
            }
        }

        debug!(
            evicted = before - entries.len(),
            remaining = entries.len(),
            "Query cache eviction"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
