//! Byte-budgeted in-process tier with least-recently-touched eviction.

use std::collections::{BTreeMap, HashMap};

use super::entry::{CacheEntry, Tier};

struct Slot {
    entry: CacheEntry,
    seq: u64,
}

/// Not synchronized; [`crate::cache::CacheManager`] owns it behind its lock.
pub struct MemoryTier {
    entries: HashMap<String, Slot>,
    /// Touch sequence → digest. The smallest key is the eviction victim.
    recency: BTreeMap<u64, String>,
    next_seq: u64,
    used_bytes: u64,
    budget: u64,
    evictions: u64,
}

impl std::fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTier")
            .field("entries", &self.entries.len())
            .field("used_bytes", &self.used_bytes)
            .field("budget", &self.budget)
            .field("evictions", &self.evictions)
            .finish()
    }
}

impl MemoryTier {
    pub fn new(budget: u64) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_seq: 0,
            used_bytes: 0,
            budget,
            evictions: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Returns the value and marks it most recently used. Expired entries are removed.
    pub fn get(&mut self, digest: &str, now: i64) -> Option<Vec<u8>> {
        let expired = self.entries.get(digest)?.entry.is_expired(now);
        if expired {
            self.remove(digest);
            return None;
        }

        let seq = self.bump();
        let slot = self.entries.get_mut(digest)?;
        self.recency.remove(&slot.seq);
        slot.seq = seq;
        slot.entry.touch(now);
        self.recency.insert(seq, digest.to_string());
        Some(slot.entry.value.clone())
    }

    /// Stores `entry`, evicting least-recently-touched entries until it fits.
    ///
    /// Returns `false` only when the entry alone exceeds the budget.
    pub fn insert(&mut self, mut entry: CacheEntry) -> bool {
        if entry.size_bytes > self.budget {
            return false;
        }

        self.remove(&entry.digest);

        while self.used_bytes + entry.size_bytes > self.budget {
            let Some((_, victim)) = self.recency.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&victim) {
                self.used_bytes -= slot.entry.size_bytes;
                self.evictions += 1;
            }
        }

        entry.tier = Tier::Memory;
        let seq = self.bump();
        self.used_bytes += entry.size_bytes;
        self.recency.insert(seq, entry.digest.clone());
        self.entries.insert(entry.digest.clone(), Slot { entry, seq });
        true
    }

    pub fn remove(&mut self, digest: &str) -> bool {
        match self.entries.remove(digest) {
            Some(slot) => {
                self.recency.remove(&slot.seq);
                self.used_bytes -= slot.entry.size_bytes;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.entries.contains_key(digest)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&mut self, now: i64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(now))
            .map(|(digest, _)| digest.clone())
            .collect();
        for digest in &expired {
            self.remove(digest);
        }
        expired.len()
    }

    /// Digests of entries whose original key contains `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, slot)| slot.entry.key.contains(pattern))
            .map(|(digest, _)| digest.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.used_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Only entries strictly smaller than this are placed in memory.
    pub fn entry_ceiling(&self, divisor: u64) -> u64 {
        self.budget / divisor.max(1)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}
