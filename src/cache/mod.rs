//! Tiered byte cache: memory, optional shared tier, and rkyv files on disk.
//!
//! Keys are normalized to hex BLAKE3 digests before any tier sees them. Reads
//! go memory → shared → disk and promote lower-tier hits into memory; writes
//! are placed by [`Priority`]:
//!
//! | Tier | Written when |
//! |---|---|
//! | memory | priority is `High` or `Normal` and the value is under a tenth of the budget |
//! | shared | configured, and priority is `High` or memory did not take it |
//! | disk | nothing else stored it, or priority is `Persistent` |

mod config;
mod disk;
mod entry;
mod error;
mod manager;
mod memory;
mod shared;

#[cfg(test)]
mod tests;

pub use config::CacheConfig;
pub use disk::{DiskTier, SweepReport};
pub use entry::{CacheEntry, Priority, Tier, now_millis};
pub use error::{CacheError, CacheResult};
pub use manager::{CACHE_METRIC, CacheManager, CacheStats, SweepSummary};
pub use memory::MemoryTier;
pub use shared::{InProcessSharedTier, SharedTier};
