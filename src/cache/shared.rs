//! Optional shared tier (a cache other processes can see).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{CacheError, CacheResult};

/// Remote key-value store keyed by hex digest.
///
/// Implementations must expire values themselves once `ttl` elapses.
#[async_trait]
pub trait SharedTier: Send + Sync {
    async fn get(&self, digest: &str) -> CacheResult<Option<Vec<u8>>>;

    /// `None` stores without expiry.
    async fn set(&self, digest: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Returns whether a value was removed.
    async fn delete(&self, digest: &str) -> CacheResult<bool>;

    async fn clear(&self) -> CacheResult<()>;
}

struct SharedValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Map-backed [`SharedTier`] for single-host deployments and tests.
///
/// [`set_available`](Self::set_available) simulates an outage: every call
/// fails with [`CacheError::Connection`] while unavailable.
pub struct InProcessSharedTier {
    values: Mutex<HashMap<String, SharedValue>>,
    available: AtomicBool,
}

impl Default for InProcessSharedTier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InProcessSharedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessSharedTier")
            .field("len", &self.values.lock().len())
            .field("available", &self.available.load(Ordering::Acquire))
            .finish()
    }
}

impl InProcessSharedTier {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.values.lock().contains_key(digest)
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::Connection {
                reason: "in-process shared tier marked unavailable".to_string(),
            })
        }
    }
}

#[async_trait]
impl SharedTier for InProcessSharedTier {
    async fn get(&self, digest: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check_available()?;
        let mut values = self.values.lock();
        let expired = match values.get(digest) {
            None => return Ok(None),
            Some(v) => v.expires_at.is_some_and(|at| Instant::now() >= at),
        };
        if expired {
            values.remove(digest);
            return Ok(None);
        }
        Ok(values.get(digest).map(|v| v.bytes.clone()))
    }

    async fn set(&self, digest: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.check_available()?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.values.lock().insert(
            digest.to_string(),
            SharedValue {
                bytes: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, digest: &str) -> CacheResult<bool> {
        self.check_available()?;
        Ok(self.values.lock().remove(digest).is_some())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.check_available()?;
        self.values.lock().clear();
        Ok(())
    }
}
