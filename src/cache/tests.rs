use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use super::*;
use crate::error::{Classified, ErrorKind};
use crate::hashing::digest_hex;
use crate::health::HealthCheckable;

fn entry(key: &str, size: usize, ttl: Duration, priority: Priority, now: i64) -> CacheEntry {
    CacheEntry::new(key, digest_hex(key), vec![7u8; size], ttl, priority, now)
}

fn manager(dir: &TempDir) -> CacheManager {
    CacheManager::new(CacheConfig::new(dir.path())).unwrap()
}

fn shared_manager(dir: &TempDir, shared: Arc<InProcessSharedTier>) -> CacheManager {
    CacheManager::with_shared(CacheConfig::new(dir.path()), shared).unwrap()
}

#[test]
fn test_entry_zero_ttl_never_expires() {
    let e = entry("k", 4, Duration::ZERO, Priority::Normal, 1_000);
    assert_eq!(e.expires_at, None);
    assert!(!e.is_expired(i64::MAX));
    assert_eq!(e.remaining_ttl(5_000), None);
}

#[test]
fn test_entry_expiry_boundary() {
    let e = entry("k", 4, Duration::from_millis(100), Priority::Normal, 1_000);
    assert_eq!(e.expires_at, Some(1_100));
    assert!(!e.is_expired(1_100));
    assert!(e.is_expired(1_101));
    assert_eq!(e.remaining_ttl(1_040), Some(Duration::from_millis(60)));
}

#[test]
fn test_entry_encode_decode() {
    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("model".to_string(), "deepseek/deepseek-v3.2".to_string());
    let mut e = entry("llm:abc", 32, Duration::from_secs(60), Priority::High, 42);
    e.metadata = metadata;

    let bytes = e.encode().unwrap();
    let decoded = CacheEntry::decode(&bytes).unwrap();
    assert_eq!(decoded, e);
}

#[test]
fn test_entry_decode_garbage_is_corrupt() {
    let err = CacheEntry::decode(b"definitely not an archive").unwrap_err();
    assert!(matches!(err, CacheError::Corrupt { .. }));
    assert_eq!(err.kind(), ErrorKind::CacheOperation);
}

#[test]
fn test_memory_evicts_least_recently_touched() {
    let mut tier = MemoryTier::new(100);
    let now = 0;
    assert!(tier.insert(entry("a", 40, Duration::ZERO, Priority::Normal, now)));
    assert!(tier.insert(entry("b", 40, Duration::ZERO, Priority::Normal, now)));

    // Touching `a` leaves `b` as the oldest.
    assert!(tier.get(&digest_hex("a"), now).is_some());
    assert!(tier.insert(entry("c", 40, Duration::ZERO, Priority::Normal, now)));

    assert!(tier.contains(&digest_hex("a")));
    assert!(!tier.contains(&digest_hex("b")));
    assert!(tier.contains(&digest_hex("c")));
    assert_eq!(tier.evictions(), 1);
    assert_eq!(tier.used_bytes(), 80);
}

#[test]
fn test_memory_replace_subtracts_old_size() {
    let mut tier = MemoryTier::new(100);
    tier.insert(entry("a", 60, Duration::ZERO, Priority::Normal, 0));
    tier.insert(entry("a", 30, Duration::ZERO, Priority::Normal, 0));
    assert_eq!(tier.len(), 1);
    assert_eq!(tier.used_bytes(), 30);
    assert_eq!(tier.evictions(), 0);
}

#[test]
fn test_memory_rejects_oversize() {
    let mut tier = MemoryTier::new(100);
    assert!(!tier.insert(entry("big", 101, Duration::ZERO, Priority::Normal, 0)));
    assert!(tier.is_empty());
}

#[test]
fn test_memory_removes_expired_on_get() {
    let mut tier = MemoryTier::new(100);
    tier.insert(entry("a", 10, Duration::from_millis(5), Priority::Normal, 0));
    assert!(tier.get(&digest_hex("a"), 10).is_none());
    assert!(tier.is_empty());
    assert_eq!(tier.used_bytes(), 0);
}

#[test]
fn test_memory_matching_uses_original_key() {
    let mut tier = MemoryTier::new(1_000);
    tier.insert(entry("retrieve:计费", 10, Duration::ZERO, Priority::Normal, 0));
    tier.insert(entry("llm:计费", 10, Duration::ZERO, Priority::Normal, 0));
    let hits = tier.matching("retrieve:");
    assert_eq!(hits, vec![digest_hex("retrieve:计费")]);
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path()).with_memory_max_bytes(0);
    let err = CacheManager::new(config).unwrap_err();
    assert!(matches!(err, CacheError::InvalidConfig { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_set_get_memory_hit() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    assert!(cache.set("greeting", b"hello".to_vec(), None, Priority::Normal).await);
    assert_eq!(cache.get("greeting").await, Some(b"hello".to_vec()));

    let stats = cache.stats();
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.memory_entries, 1);
    // Normal entries that fit in memory never reach disk.
    assert_eq!(stats.disk_entries, 0);
}

#[tokio::test]
async fn test_miss_counts() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    assert_eq!(cache.get("absent").await, None);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.gets, 1);
    assert_eq!(stats.hit_rate, 0.0);
}

#[tokio::test]
async fn test_low_priority_goes_to_disk() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    assert!(cache.set("cold", b"value".to_vec(), None, Priority::Low).await);
    let stats = cache.stats();
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.disk_entries, 1);
    assert!(dir.path().join(format!("{}.cache", digest_hex("cold"))).exists());

    assert_eq!(cache.get("cold").await, Some(b"value".to_vec()));
    assert_eq!(cache.stats().disk_hits, 1);
    // Low priority is never promoted.
    assert_eq!(cache.stats().memory_entries, 0);
}

#[tokio::test]
async fn test_persistent_priority_always_writes_disk() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    assert!(cache.set("keep", b"v".to_vec(), None, Priority::Persistent).await);
    assert_eq!(cache.stats().disk_entries, 1);
}

#[tokio::test]
async fn test_large_value_skips_memory() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path()).with_memory_max_bytes(1_000);
    let cache = CacheManager::new(config).unwrap();
    assert_eq!(cache.memory_entry_limit(), 100);

    // Exactly budget / 10 is not strictly smaller, so it lands on disk.
    assert!(cache.set("edge", vec![1u8; 100], None, Priority::Normal).await);
    assert!(cache.set("small", vec![1u8; 99], None, Priority::Normal).await);
    let stats = cache.stats();
    assert_eq!(stats.memory_entries, 1);
    assert_eq!(stats.disk_entries, 1);
}

#[tokio::test]
async fn test_disk_hit_promotes_to_memory() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    let disk = DiskTier::new(dir.path().to_path_buf());
    disk.write(&entry("warm", 16, Duration::from_secs(60), Priority::Normal, now_millis()))
        .unwrap();

    assert!(cache.get("warm").await.is_some());
    assert!(cache.get("warm").await.is_some());
    let stats = cache.stats();
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.memory_hits, 1);
}

#[tokio::test]
async fn test_memory_eviction_drops_values() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path()).with_memory_max_bytes(1_000);
    let cache = CacheManager::new(config).unwrap();

    for i in 0..20 {
        assert!(cache.set(&format!("k{i}"), vec![0u8; 90], None, Priority::Normal).await);
    }
    let stats = cache.stats();
    assert!(stats.memory_bytes <= 1_000);
    assert_eq!(stats.memory_evictions, 9);
    assert_eq!(cache.get("k0").await, None);
    assert!(cache.get("k19").await.is_some());
}

#[tokio::test]
async fn test_ttl_expiry() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    cache
        .set("short", b"v".to_vec(), Some(Duration::from_millis(30)), Priority::Normal)
        .await;
    cache
        .set("short-disk", b"v".to_vec(), Some(Duration::from_millis(30)), Priority::Low)
        .await;
    cache
        .set("forever", b"v".to_vec(), Some(Duration::ZERO), Priority::Normal)
        .await;

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(cache.get("short").await, None);
    assert_eq!(cache.get("short-disk").await, None);
    assert!(cache.get("forever").await.is_some());
    // The expired disk record was deleted on touch.
    assert_eq!(cache.stats().disk_entries, 0);
}

#[tokio::test]
async fn test_corrupt_disk_record_is_miss_and_removed() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    let path = dir.path().join(format!("{}.cache", digest_hex("broken")));
    std::fs::write(&path, b"garbage bytes").unwrap();

    assert_eq!(cache.get("broken").await, None);
    assert!(!path.exists());
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn test_shared_tier_high_priority() {
    let dir = TempDir::new().unwrap();
    let shared = Arc::new(InProcessSharedTier::new());
    let cache = shared_manager(&dir, Arc::clone(&shared));

    assert!(cache.set("hot", b"v".to_vec(), None, Priority::High).await);
    assert!(shared.contains(&digest_hex("hot")));
    assert_eq!(cache.stats().memory_entries, 1);

    // Normal entries stay local when memory takes them.
    assert!(cache.set("plain", b"v".to_vec(), None, Priority::Normal).await);
    assert!(!shared.contains(&digest_hex("plain")));
}

#[tokio::test]
async fn test_shared_hit_promotes_to_memory() {
    let shared = Arc::new(InProcessSharedTier::new());
    let writer_dir = TempDir::new().unwrap();
    let reader_dir = TempDir::new().unwrap();
    let writer = shared_manager(&writer_dir, Arc::clone(&shared));
    let reader = shared_manager(&reader_dir, Arc::clone(&shared));

    writer.set("hot", b"shared".to_vec(), None, Priority::High).await;

    assert_eq!(reader.get("hot").await, Some(b"shared".to_vec()));
    assert_eq!(reader.get("hot").await, Some(b"shared".to_vec()));
    let stats = reader.stats();
    assert_eq!(stats.shared_hits, 1);
    assert_eq!(stats.memory_hits, 1);
    assert!(stats.shared_enabled);
}

#[tokio::test]
async fn test_shared_outage_degrades_to_disk() {
    let dir = TempDir::new().unwrap();
    let shared = Arc::new(InProcessSharedTier::new());
    shared.set_available(false);
    let cache = shared_manager(&dir, Arc::clone(&shared));

    assert!(cache.set("cold", b"v".to_vec(), None, Priority::Low).await);
    assert_eq!(cache.stats().disk_entries, 1);
    assert_eq!(cache.get("cold").await, Some(b"v".to_vec()));

    // Failed write, the stale-copy delete that follows it, then the failed read.
    let stats = cache.stats();
    assert_eq!(stats.shared_errors, 3);
    assert_eq!(stats.disk_hits, 1);
}

#[tokio::test]
async fn test_delete_all_tiers() {
    let dir = TempDir::new().unwrap();
    let shared = Arc::new(InProcessSharedTier::new());
    let cache = shared_manager(&dir, Arc::clone(&shared));

    cache.set("k", b"v".to_vec(), None, Priority::High).await;
    cache.set("p", b"v".to_vec(), None, Priority::Persistent).await;

    assert!(cache.delete("k").await);
    assert!(cache.delete("p").await);
    assert!(!cache.delete("never-set").await);

    assert!(shared.is_empty());
    assert_eq!(cache.get("k").await, None);
    assert_eq!(cache.get("p").await, None);
    assert_eq!(cache.stats().deletes, 3);
}

#[tokio::test]
async fn test_clear_by_pattern() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    cache.set("retrieve:a", b"1".to_vec(), None, Priority::Normal).await;
    cache.set("retrieve:b", b"2".to_vec(), None, Priority::Low).await;
    cache.set("llm:c", b"3".to_vec(), None, Priority::Normal).await;

    assert_eq!(cache.clear(Some("retrieve:")).await, 2);
    assert_eq!(cache.get("retrieve:a").await, None);
    assert_eq!(cache.get("retrieve:b").await, None);
    assert_eq!(cache.get("llm:c").await, Some(b"3".to_vec()));
}

#[tokio::test]
async fn test_clear_all() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    cache.set("a", b"1".to_vec(), None, Priority::Normal).await;
    cache.set("b", b"2".to_vec(), None, Priority::Low).await;

    assert_eq!(cache.clear(None).await, 2);
    let stats = cache.stats();
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.disk_entries, 0);
}

#[tokio::test]
async fn test_json_helpers() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Answer {
        text: String,
        score: f32,
    }

    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    let answer = Answer {
        text: "按调用次数计费".to_string(),
        score: 0.9,
    };

    assert!(cache.set_json("answer", &answer, None, Priority::Normal).await);
    assert_eq!(cache.get_json::<Answer>("answer").await, Some(answer));

    cache.set("raw", b"not json".to_vec(), None, Priority::Normal).await;
    assert_eq!(cache.get_json::<Answer>("raw").await, None);
}

#[tokio::test]
async fn test_get_or_compute_caches_success_only() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let calls = &counter;

    for _ in 0..3 {
        let value: Result<u32, String> = cache
            .get_or_compute("computed", None, Priority::Normal, move || async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(42)
            })
            .await;
        assert_eq!(value, Ok(42));
    }
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let failed: Result<u32, String> = cache
        .get_or_compute("failing", None, Priority::Normal, || async {
            Err("upstream down".to_string())
        })
        .await;
    assert_eq!(failed, Err("upstream down".to_string()));
    assert_eq!(cache.get("failing").await, None);
}

#[test]
fn test_disk_sweep_evicts_oldest_to_target() {
    let dir = TempDir::new().unwrap();
    let disk = DiskTier::new(dir.path().to_path_buf());
    let now = now_millis();

    for i in 0..10u64 {
        let e = entry(&format!("k{i}"), 1_000, Duration::ZERO, Priority::Low, now);
        disk.write(&e).unwrap();
        let path = dir.path().join(format!("{}.cache", e.digest));
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 + i))
            .unwrap();
    }

    let total = disk.total_bytes();
    let max = total / 2;
    let report = disk.sweep(now, max, 0.8);

    assert!(report.evicted > 0);
    assert!(report.bytes_after <= (max as f64 * 0.8) as u64);
    assert_eq!(disk.total_bytes(), report.bytes_after);
    assert!(disk.read(&digest_hex("k9"), now).is_some());
    assert!(disk.read(&digest_hex("k0"), now).is_none());
}

#[test]
fn test_disk_sweep_under_limit_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let disk = DiskTier::new(dir.path().to_path_buf());
    let now = now_millis();
    for i in 0..3 {
        disk.write(&entry(&format!("k{i}"), 10, Duration::ZERO, Priority::Low, now))
            .unwrap();
    }
    let report = disk.sweep(now, u64::MAX, 0.8);
    assert_eq!(report.evicted, 0);
    assert_eq!(disk.len(), 3);
}

#[test]
fn test_disk_sweep_removes_expired_and_corrupt() {
    let dir = TempDir::new().unwrap();
    let disk = DiskTier::new(dir.path().to_path_buf());
    let now = now_millis();

    disk.write(&entry("old", 10, Duration::from_millis(1), Priority::Low, now - 10_000))
        .unwrap();
    disk.write(&entry("live", 10, Duration::ZERO, Priority::Low, now))
        .unwrap();
    std::fs::write(dir.path().join("deadbeef.cache"), b"junk").unwrap();

    let report = disk.sweep(now, u64::MAX, 0.8);
    assert_eq!(report.expired, 1);
    assert_eq!(report.corrupt, 1);
    assert_eq!(disk.len(), 1);
}

#[tokio::test]
async fn test_sweep_now_updates_stats() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    cache
        .set("brief", b"v".to_vec(), Some(Duration::from_millis(10)), Priority::Normal)
        .await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    let summary = cache.sweep_now();
    assert_eq!(summary.memory_expired, 1);
    let stats = cache.stats();
    assert_eq!(stats.expired_removed, 1);
    assert_eq!(stats.memory_entries, 0);
}

#[tokio::test]
async fn test_background_sweeper_lifecycle() {
    let dir = TempDir::new().unwrap();
    let mut config = CacheConfig::new(dir.path());
    config.cleanup_interval = Duration::from_millis(20);
    let cache = CacheManager::new(config).unwrap();

    let disk = DiskTier::new(dir.path().to_path_buf());
    disk.write(&entry("stale", 10, Duration::from_millis(1), Priority::Low, now_millis() - 5_000))
        .unwrap();

    assert!(cache.start_sweeper());
    assert!(!cache.start_sweeper());
    assert!(cache.is_sweeper_running());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(disk.is_empty());
    assert!(cache.stats().expired_removed >= 1);

    cache.shutdown();
    cache.shutdown();
    assert!(cache.is_shutdown());
    assert!(!cache.is_sweeper_running());
    assert!(!cache.start_sweeper());
}

#[tokio::test]
async fn test_health_ready_when_writable() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    assert_eq!(cache.component(), "cache");
    let report = cache.check_health().await;
    assert!(report.ready);
    assert!(report.detail.get("hit_rate").is_some());
}

#[tokio::test]
async fn test_health_not_ready_when_dir_unusable() {
    let root = TempDir::new().unwrap();
    let cache_dir = root.path().join("cache");
    let cache = CacheManager::new(CacheConfig::new(&cache_dir)).unwrap();

    std::fs::remove_dir_all(&cache_dir).unwrap();
    std::fs::write(&cache_dir, b"now a file").unwrap();

    let report = cache.check_health().await;
    assert!(!report.ready);
    assert!(report.detail.get("error").is_some());
}

#[tokio::test]
async fn test_clones_share_state() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    let clone = cache.clone();
    cache.set("k", b"v".to_vec(), None, Priority::Normal).await;
    assert_eq!(clone.get("k").await, Some(b"v".to_vec()));
    assert_eq!(cache.stats().memory_hits, 1);
}

#[tokio::test]
async fn test_overwrite_to_disk_drops_memory_copy() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    cache.set("k", b"old".to_vec(), None, Priority::Normal).await;
    cache.set("k", b"new".to_vec(), None, Priority::Low).await;

    assert_eq!(cache.get("k").await, Some(b"new".to_vec()));
    let stats = cache.stats();
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.disk_hits, 1);
}

#[tokio::test]
async fn test_overwrite_to_memory_drops_disk_copy() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path()).with_memory_max_bytes(1_000);
    let cache = CacheManager::new(config).unwrap();

    cache.set("k", b"old".to_vec(), None, Priority::Low).await;
    cache.set("k", b"new".to_vec(), None, Priority::Normal).await;
    assert_eq!(cache.stats().disk_entries, 0);

    // Push `k` out of memory; nothing older may resurface from disk.
    for i in 0..20 {
        cache.set(&format!("filler{i}"), vec![0u8; 90], None, Priority::Normal).await;
    }
    assert_eq!(cache.get("k").await, None);
}

#[tokio::test]
async fn test_overwrite_drops_shared_copy() {
    let dir = TempDir::new().unwrap();
    let shared = Arc::new(InProcessSharedTier::new());
    let cache = shared_manager(&dir, Arc::clone(&shared));

    cache.set("k", b"old".to_vec(), None, Priority::High).await;
    assert!(shared.contains(&digest_hex("k")));

    cache.set("k", b"new".to_vec(), None, Priority::Normal).await;
    assert!(!shared.contains(&digest_hex("k")));

    let reader_dir = TempDir::new().unwrap();
    let replica = shared_manager(&reader_dir, Arc::clone(&shared));
    assert_eq!(replica.get("k").await, None);
    assert_eq!(cache.get("k").await, Some(b"new".to_vec()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disk_writes_of_one_key() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);

    for round in 0..20 {
        let writers: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set("same", vec![round, i], None, Priority::Low).await
                })
            })
            .collect();
        for writer in writers {
            assert!(writer.await.unwrap());
        }
        let value = cache.get("same").await.unwrap();
        assert_eq!(value[0], round);
    }

    assert_eq!(cache.stats().disk_entries, 1);
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_memory_budget_holds_across_mixed_sets() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path()).with_memory_max_bytes(2_000);
    let cache = CacheManager::new(config).unwrap();

    let mut last_evictions = 0;
    for i in 0..200usize {
        let size = 1 + (i * 37) % 250;
        cache.set(&format!("k{}", i % 60), vec![1u8; size], None, Priority::Normal).await;

        let stats = cache.stats();
        assert!(stats.memory_bytes <= stats.memory_limit);
        assert!(stats.memory_evictions >= last_evictions);
        last_evictions = stats.memory_evictions;
    }
    assert!(last_evictions > 0);
}

/// Serves undecodable bytes and refuses deletes.
struct BrokenShared;

#[async_trait::async_trait]
impl SharedTier for BrokenShared {
    async fn get(&self, _digest: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(Some(b"not a cache entry".to_vec()))
    }

    async fn set(&self, _digest: &str, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _digest: &str) -> CacheResult<bool> {
        Err(CacheError::Connection {
            reason: "read-only replica".to_string(),
        })
    }

    async fn clear(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_shared_delete_is_counted() {
    let dir = TempDir::new().unwrap();
    let cache = CacheManager::with_shared(CacheConfig::new(dir.path()), Arc::new(BrokenShared))
        .unwrap();

    assert_eq!(cache.get("k").await, None);
    let stats = cache.stats();
    assert_eq!(stats.shared_errors, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_attached_metrics_count_lookups() {
    let dir = TempDir::new().unwrap();
    let cache = manager(&dir);
    let metrics = Arc::new(crate::metrics::MetricsRegistry::new());
    assert!(cache.clone().attach_metrics(Arc::clone(&metrics)));
    assert!(!cache.attach_metrics(Arc::new(crate::metrics::MetricsRegistry::new())));

    assert!(cache.get("absent").await.is_none());
    assert!(cache.set("hot", b"v".to_vec(), None, Priority::Normal).await);
    assert!(cache.set("cold", b"v".to_vec(), None, Priority::Low).await);
    assert!(cache.get("hot").await.is_some());
    assert!(cache.get("cold").await.is_some());

    let counts = metrics.summary().cache[CACHE_METRIC];
    assert_eq!(counts.hits, 2);
    assert_eq!(counts.misses, 1);
}
