use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use super::config::CacheConfig;
use super::disk::{DiskTier, SweepReport};
use super::entry::{CacheEntry, Priority, Tier, now_millis};
use super::error::{CacheError, CacheResult};
use super::memory::MemoryTier;
use super::shared::SharedTier;
use crate::constants::{DISK_TARGET_RATIO, MEMORY_ENTRY_DIVISOR};
use crate::hashing::digest_hex;
use crate::health::{HealthCheckable, HealthReport};
use crate::metrics::MetricsRegistry;

/// Cache label used in [`MetricsRegistry`] for lookups through the tiers.
pub const CACHE_METRIC: &str = "tiered";

const HEALTH_PROBE_FILENAME: &str = ".kestrel_probe";

#[derive(Debug, Default)]
struct CacheCounters {
    memory_hits: u64,
    shared_hits: u64,
    disk_hits: u64,
    misses: u64,
    gets: u64,
    sets: u64,
    deletes: u64,
    shared_errors: u64,
    disk_evictions: u64,
    expired_removed: u64,
}

#[derive(Debug)]
struct CacheState {
    memory: MemoryTier,
    counters: CacheCounters,
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub shared_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub memory_evictions: u64,
    pub disk_evictions: u64,
    pub expired_removed: u64,
    pub shared_errors: u64,
    pub memory_bytes: u64,
    pub memory_limit: u64,
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub shared_enabled: bool,
    /// Hits over gets, `0.0` before the first get.
    pub hit_rate: f64,
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub memory_expired: usize,
    pub disk: SweepReport,
}

struct CacheInner {
    config: CacheConfig,
    state: Mutex<CacheState>,
    disk: DiskTier,
    shared: Option<Arc<dyn SharedTier>>,
    metrics: OnceLock<Arc<MetricsRegistry>>,
    shutdown: AtomicBool,
    sweeper_running: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheInner {
    fn sweep(&self) -> SweepSummary {
        let now = now_millis();
        let memory_expired = self.state.lock().memory.purge_expired(now);
        let disk = self
            .disk
            .sweep(now, self.config.disk_max_bytes, DISK_TARGET_RATIO);

        let mut state = self.state.lock();
        state.counters.expired_removed += (memory_expired + disk.expired) as u64;
        state.counters.disk_evictions += disk.evicted as u64;
        SweepSummary {
            memory_expired,
            disk,
        }
    }
}

/// Three-tier byte cache: memory, optional shared, then disk.
///
/// Cheap to clone; clones share tiers and counters.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_dir", &self.inner.config.cache_dir)
            .field("shared", &self.inner.shared.is_some())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Acquire))
            .finish()
    }
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Self::build(config, None)
    }

    pub fn with_shared(config: CacheConfig, shared: Arc<dyn SharedTier>) -> CacheResult<Self> {
        Self::build(config, Some(shared))
    }

    fn build(config: CacheConfig, shared: Option<Arc<dyn SharedTier>>) -> CacheResult<Self> {
        config
            .validate()
            .map_err(|reason| CacheError::InvalidConfig { reason })?;

        let disk = DiskTier::new(config.cache_dir.clone());
        disk.ensure_dir()?;

        info!(
            cache_dir = %config.cache_dir.display(),
            memory_max_bytes = config.memory_max_bytes,
            disk_max_bytes = config.disk_max_bytes,
            shared = shared.is_some(),
            "Cache manager initialized"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    memory: MemoryTier::new(config.memory_max_bytes),
                    counters: CacheCounters::default(),
                }),
                disk,
                shared,
                metrics: OnceLock::new(),
                shutdown: AtomicBool::new(false),
                sweeper_running: AtomicBool::new(false),
                sweeper: Mutex::new(None),
                config,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Reports every lookup to `metrics` from now on, for this manager and its clones.
    ///
    /// Returns `false` if a registry was already attached.
    pub fn attach_metrics(&self, metrics: Arc<MetricsRegistry>) -> bool {
        self.inner.metrics.set(metrics).is_ok()
    }

    fn record_lookup(&self, hit: bool) {
        if let Some(metrics) = self.inner.metrics.get() {
            metrics.record_cache(CACHE_METRIC, hit);
        }
    }

    fn memory_ceiling(&self) -> u64 {
        self.inner
            .state
            .lock()
            .memory
            .entry_ceiling(MEMORY_ENTRY_DIVISOR)
    }

    /// Places `entry` in memory when its priority and size allow it.
    fn promote(&self, entry: CacheEntry) {
        if !entry.priority.memory_eligible() {
            return;
        }
        let mut state = self.inner.state.lock();
        if entry.size_bytes < state.memory.entry_ceiling(MEMORY_ENTRY_DIVISOR) {
            state.memory.insert(entry);
        }
    }

    /// Looks the key up memory-first. Shared and disk hits are promoted to memory.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let digest = digest_hex(key);
        let now = now_millis();

        {
            let mut state = self.inner.state.lock();
            state.counters.gets += 1;
            if let Some(value) = state.memory.get(&digest, now) {
                state.counters.memory_hits += 1;
                drop(state);
                self.record_lookup(true);
                return Some(value);
            }
        }

        if let Some(shared) = &self.inner.shared {
            match shared.get(&digest).await {
                Ok(Some(bytes)) => match CacheEntry::decode(&bytes) {
                    Ok(entry) if !entry.is_expired(now) => {
                        let value = entry.value.clone();
                        self.inner.state.lock().counters.shared_hits += 1;
                        self.promote(entry);
                        self.record_lookup(true);
                        return Some(value);
                    }
                    Ok(_) => {
                        self.delete_shared(&digest).await;
                    }
                    Err(e) => {
                        warn!(digest = %digest, error = %e, "Corrupt shared cache value dropped");
                        self.delete_shared(&digest).await;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Shared cache read failed; continuing with disk");
                    self.inner.state.lock().counters.shared_errors += 1;
                }
            }
        }

        if let Some(entry) = self.inner.disk.read(&digest, now) {
            let value = entry.value.clone();
            self.inner.state.lock().counters.disk_hits += 1;
            self.promote(entry);
            self.record_lookup(true);
            return Some(value);
        }

        self.inner.state.lock().counters.misses += 1;
        self.record_lookup(false);
        debug!(digest = %digest, "Cache miss");
        None
    }

    /// Stores a value. `ttl: None` uses the configured default; a zero TTL never expires.
    ///
    /// Returns whether any tier accepted the value. Tiers the new value skips
    /// drop any older value for the same key.
    #[instrument(skip(self, value), fields(bytes = value.len()), level = "debug")]
    pub async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        priority: Priority,
    ) -> bool {
        let ttl = ttl.unwrap_or(self.inner.config.default_ttl);
        let now = now_millis();
        let entry = CacheEntry::new(key, digest_hex(key), value, ttl, priority, now);

        let stored_memory = {
            let mut state = self.inner.state.lock();
            state.counters.sets += 1;
            let stored = priority.memory_eligible()
                && entry.size_bytes < state.memory.entry_ceiling(MEMORY_ENTRY_DIVISOR)
                && state.memory.insert(entry.clone());
            if !stored {
                state.memory.remove(&entry.digest);
            }
            stored
        };

        let mut stored_shared = false;
        if let Some(shared) = &self.inner.shared {
            if priority == Priority::High || !stored_memory {
                let mut record = entry.clone();
                record.tier = Tier::Shared;
                let result = match record.encode() {
                    Ok(bytes) => {
                        shared
                            .set(&entry.digest, &bytes, record.remaining_ttl(now))
                            .await
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => stored_shared = true,
                    Err(e) => {
                        warn!(error = %e, "Shared cache write failed; falling back to local tiers");
                        self.inner.state.lock().counters.shared_errors += 1;
                    }
                }
            }
            if !stored_shared {
                self.delete_shared(&entry.digest).await;
            }
        }

        let mut stored_disk = false;
        if (!stored_memory && !stored_shared) || priority == Priority::Persistent {
            match self.inner.disk.write(&entry) {
                Ok(()) => stored_disk = true,
                Err(e) => warn!(error = %e, "Disk cache write failed"),
            }
        }
        if !stored_disk {
            self.inner.disk.remove(&entry.digest);
        }

        stored_memory || stored_shared || stored_disk
    }

    /// Removes the key from every tier. Returns whether any tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        let digest = digest_hex(key);
        let removed_memory = {
            let mut state = self.inner.state.lock();
            state.counters.deletes += 1;
            state.memory.remove(&digest)
        };
        let removed_shared = self.delete_shared(&digest).await;
        let removed_disk = self.inner.disk.remove(&digest);
        removed_memory || removed_shared || removed_disk
    }

    async fn delete_shared(&self, digest: &str) -> bool {
        let Some(shared) = &self.inner.shared else {
            return false;
        };
        match shared.delete(digest).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Shared cache delete failed");
                self.inner.state.lock().counters.shared_errors += 1;
                false
            }
        }
    }

    /// Clears every tier, or only keys containing `pattern`.
    ///
    /// Returns how many distinct local entries were removed.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        match pattern {
            None => {
                let memory = {
                    let mut state = self.inner.state.lock();
                    let n = state.memory.len();
                    state.memory.clear();
                    n
                };
                let disk = self.inner.disk.clear();
                if let Some(shared) = &self.inner.shared
                    && let Err(e) = shared.clear().await
                {
                    warn!(error = %e, "Shared cache clear failed");
                    self.inner.state.lock().counters.shared_errors += 1;
                }
                info!(memory, disk, "Cache cleared");
                memory + disk
            }
            Some(pattern) => {
                let mut digests = self.inner.state.lock().memory.matching(pattern);
                for digest in self.inner.disk.matching(pattern) {
                    if !digests.contains(&digest) {
                        digests.push(digest);
                    }
                }
                for digest in &digests {
                    self.inner.state.lock().memory.remove(digest);
                    self.inner.disk.remove(digest);
                    self.delete_shared(digest).await;
                }
                info!(pattern, removed = digests.len(), "Cache entries cleared by pattern");
                digests.len()
            }
        }
    }

    /// Decodes a JSON value stored with [`set_json`](Self::set_json). Undecodable values read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached value is not valid JSON for the requested type");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        priority: Priority,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, bytes, ttl, priority).await,
            Err(e) => {
                warn!(key, error = %e, "Value could not be serialized for caching");
                false
            }
        }
    }

    /// Cache-aside: returns the cached value or runs `compute` and caches its success.
    ///
    /// Errors from `compute` are returned unchanged and never cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        priority: Priority,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_json(key).await {
            return Ok(value);
        }
        let value = compute().await?;
        self.set_json(key, &value, ttl, priority).await;
        Ok(value)
    }

    /// Starts the periodic sweep. Returns `false` if it is already running or the manager is shut down.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sweeper(&self) -> bool {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return false;
        }
        if self.inner.sweeper_running.swap(true, Ordering::AcqRel) {
            return false;
        }

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.cleanup_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let summary = inner.sweep();
                debug!(
                    memory_expired = summary.memory_expired,
                    disk_expired = summary.disk.expired,
                    disk_evicted = summary.disk.evicted,
                    disk_bytes = summary.disk.bytes_after,
                    "Cache sweep complete"
                );
            }
        });
        *self.inner.sweeper.lock() = Some(handle);
        true
    }

    pub fn is_sweeper_running(&self) -> bool {
        self.inner.sweeper_running.load(Ordering::Acquire)
            && !self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Runs one sweep synchronously.
    pub fn sweep_now(&self) -> SweepSummary {
        self.inner.sweep()
    }

    /// Stops the background sweep. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }
        self.inner.sweeper_running.store(false, Ordering::Release);
        info!("Cache manager shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CacheStats {
        let disk_entries = self.inner.disk.len();
        let state = self.inner.state.lock();
        let c = &state.counters;
        let hits = c.memory_hits + c.shared_hits + c.disk_hits;
        let hit_rate = if c.gets == 0 {
            0.0
        } else {
            hits as f64 / c.gets as f64
        };
        CacheStats {
            memory_hits: c.memory_hits,
            shared_hits: c.shared_hits,
            disk_hits: c.disk_hits,
            misses: c.misses,
            gets: c.gets,
            sets: c.sets,
            deletes: c.deletes,
            memory_evictions: state.memory.evictions(),
            disk_evictions: c.disk_evictions,
            expired_removed: c.expired_removed,
            shared_errors: c.shared_errors,
            memory_bytes: state.memory.used_bytes(),
            memory_limit: state.memory.budget(),
            memory_entries: state.memory.len(),
            disk_entries,
            shared_enabled: self.inner.shared.is_some(),
            hit_rate,
        }
    }

    /// Largest value size (exclusive) the memory tier accepts.
    pub fn memory_entry_limit(&self) -> u64 {
        self.memory_ceiling()
    }

    fn probe_writable(&self) -> Result<(), std::io::Error> {
        self.inner.disk.ensure_dir().map_err(|e| match e {
            CacheError::Io(io) => io,
            other => std::io::Error::other(other.to_string()),
        })?;
        let probe = self.inner.disk.dir().join(HEALTH_PROBE_FILENAME);
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)
    }
}

#[async_trait]
impl HealthCheckable for CacheManager {
    fn component(&self) -> &'static str {
        "cache"
    }

    async fn check_health(&self) -> HealthReport {
        let stats = self.stats();
        let detail = json!({
            "cache_dir": self.inner.config.cache_dir.display().to_string(),
            "memory_entries": stats.memory_entries,
            "memory_bytes": stats.memory_bytes,
            "disk_entries": stats.disk_entries,
            "hit_rate": stats.hit_rate,
        });
        match self.probe_writable() {
            Ok(()) => HealthReport::ready(detail),
            Err(e) => {
                warn!(error = %e, "Cache directory is not writable");
                HealthReport::not_ready(json!({
                    "cache_dir": self.inner.config.cache_dir.display().to_string(),
                    "error": e.to_string(),
                }))
            }
        }
    }
}
