//! Cache record shared by every tier.

use std::collections::BTreeMap;
use std::time::Duration;

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use super::error::CacheError;

/// Placement hint for [`crate::cache::CacheManager::set`].
#[derive(
    Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Skips the memory tier.
    Low,
    #[default]
    Normal,
    /// Also written to the shared tier when it is configured.
    High,
    /// Always written to disk, in addition to any faster tier.
    Persistent,
}

impl Priority {
    pub fn memory_eligible(self) -> bool {
        matches!(self, Priority::High | Priority::Normal)
    }
}

/// Tier that last stored the entry.
#[derive(
    Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Memory,
    Shared,
    Disk,
}

/// Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Caller's key before normalization, kept for pattern clears.
    pub key: String,
    /// Hex BLAKE3 digest of `key`; the identity used by every tier.
    pub digest: String,
    pub value: Vec<u8>,
    pub created_at: i64,
    /// `None` never expires.
    pub expires_at: Option<i64>,
    pub access_count: u64,
    pub last_access: i64,
    pub size_bytes: u64,
    pub tier: Tier,
    pub priority: Priority,
    pub metadata: BTreeMap<String, String>,
}

impl CacheEntry {
    /// A zero `ttl` produces an entry that never expires.
    pub fn new(
        key: &str,
        digest: String,
        value: Vec<u8>,
        ttl: Duration,
        priority: Priority,
        now: i64,
    ) -> Self {
        let expires_at = (!ttl.is_zero()).then(|| now.saturating_add(ttl.as_millis() as i64));
        let size_bytes = value.len() as u64;
        Self {
            key: key.to_string(),
            digest,
            value,
            created_at: now,
            expires_at,
            access_count: 0,
            last_access: now,
            size_bytes,
            tier: Tier::Memory,
            priority,
            metadata: BTreeMap::new(),
        }
    }

    /// Logically absent once `now` has passed `expires_at`.
    #[inline]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Remaining lifetime, or `None` for entries that never expire.
    pub fn remaining_ttl(&self, now: i64) -> Option<Duration> {
        self.expires_at
            .map(|at| Duration::from_millis(at.saturating_sub(now).max(0) as u64))
    }

    pub fn touch(&mut self, now: i64) {
        self.access_count += 1;
        self.last_access = now;
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        rkyv::to_bytes::<RkyvError>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<CacheEntry, RkyvError>(&aligned).map_err(|e| CacheError::Corrupt {
            reason: e.to_string(),
        })
    }
}
