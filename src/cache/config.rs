use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_DISK_MAX_BYTES,
    DEFAULT_MEMORY_MAX_BYTES,
};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory for `<digest>.cache` records.
    pub cache_dir: PathBuf,
    pub memory_max_bytes: u64,
    pub disk_max_bytes: u64,
    /// Applied when `set` is called without a TTL.
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            memory_max_bytes: DEFAULT_MEMORY_MAX_BYTES,
            disk_max_bytes: DEFAULT_DISK_MAX_BYTES,
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_memory_max_bytes(mut self, bytes: u64) -> Self {
        self.memory_max_bytes = bytes;
        self
    }

    pub fn with_disk_max_bytes(mut self, bytes: u64) -> Self {
        self.disk_max_bytes = bytes;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir cannot be empty".to_string());
        }
        if self.memory_max_bytes == 0 {
            return Err("memory_max_bytes must be non-zero".to_string());
        }
        if self.disk_max_bytes == 0 {
            return Err("disk_max_bytes must be non-zero".to_string());
        }
        if self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be non-zero".to_string());
        }
        Ok(())
    }
}
