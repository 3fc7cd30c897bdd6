//! File-per-entry disk tier (`<digest>.cache`, rkyv encoded).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::entry::{CacheEntry, Tier};
use super::error::CacheResult;

const CACHE_EXTENSION: &str = "cache";
const TEMP_EXTENSION: &str = "cache.tmp";

/// Result of one disk sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub corrupt: usize,
    pub evicted: usize,
    pub bytes_after: u64,
}

/// Every operation holds `lock`, so writes, reads, removals and sweeps never interleave
/// within one process. Temp names are unique per write for writers in other processes.
#[derive(Debug)]
pub struct DiskTier {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl DiskTier {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> CacheResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.{CACHE_EXTENSION}"))
    }

    fn temp_path(&self, digest: &str) -> PathBuf {
        self.dir
            .join(format!("{digest}.{}.{TEMP_EXTENSION}", uuid::Uuid::new_v4().simple()))
    }

    /// Writes through a temp file and rename so readers never see partial records.
    pub fn write(&self, entry: &CacheEntry) -> CacheResult<()> {
        let mut record = entry.clone();
        record.tier = Tier::Disk;
        let bytes = record.encode()?;

        let _guard = self.lock.lock();
        self.ensure_dir()?;
        let temp_path = self.temp_path(&entry.digest);
        let written = File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, self.entry_path(&entry.digest)));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads a live record. Corrupt and expired files are deleted and read as a miss.
    pub fn read(&self, digest: &str, now: i64) -> Option<CacheEntry> {
        let _guard = self.lock.lock();
        let path = self.entry_path(digest);
        let bytes = fs::read(&path).ok()?;

        match CacheEntry::decode(&bytes) {
            Ok(entry) if entry.is_expired(now) => {
                debug!(digest, "Expired disk record removed");
                let _ = fs::remove_file(&path);
                None
            }
            Ok(entry) => {
                touch(&path);
                Some(entry)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt disk cache record removed");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    pub fn remove(&self, digest: &str) -> bool {
        let _guard = self.lock.lock();
        fs::remove_file(self.entry_path(digest)).is_ok()
    }

    fn record_files(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == CACHE_EXTENSION)
                    && !path.to_string_lossy().ends_with(TEMP_EXTENSION)
            })
            .collect()
    }

    /// Digests of records whose original key contains `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        let _guard = self.lock.lock();
        self.record_files()
            .into_iter()
            .filter_map(|path| {
                let bytes = fs::read(&path).ok()?;
                let entry = CacheEntry::decode(&bytes).ok()?;
                entry.key.contains(pattern).then_some(entry.digest)
            })
            .collect()
    }

    /// Removes every record. Returns how many files were deleted.
    pub fn clear(&self) -> usize {
        let _guard = self.lock.lock();
        self.record_files()
            .into_iter()
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        let _guard = self.lock.lock();
        self.record_files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        let _guard = self.lock.lock();
        self.record_files()
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Drops expired and corrupt records, then, if usage exceeds `max_bytes`,
    /// evicts least-recently-accessed files until usage is at most
    /// `max_bytes * target_ratio`.
    pub fn sweep(&self, now: i64, max_bytes: u64, target_ratio: f64) -> SweepReport {
        let _guard = self.lock.lock();
        let mut report = SweepReport::default();
        let mut live: Vec<(PathBuf, u64, SystemTime)> = Vec::new();

        for path in self.record_files() {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            match CacheEntry::decode(&bytes) {
                Ok(entry) if entry.is_expired(now) => {
                    if fs::remove_file(&path).is_ok() {
                        report.expired += 1;
                    }
                }
                Ok(_) => {
                    let accessed = fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    live.push((path, bytes.len() as u64, accessed));
                }
                Err(_) => {
                    if fs::remove_file(&path).is_ok() {
                        report.corrupt += 1;
                    }
                }
            }
        }

        let mut total: u64 = live.iter().map(|(_, size, _)| size).sum();
        if total > max_bytes {
            let target = (max_bytes as f64 * target_ratio) as u64;
            live.sort_by_key(|(_, _, accessed)| *accessed);
            for (path, size, _) in live {
                if total <= target {
                    break;
                }
                if fs::remove_file(&path).is_ok() {
                    total -= size;
                    report.evicted += 1;
                }
            }
        }

        report.bytes_after = total;
        report
    }
}

/// Refreshes the file's modification time, which the sweep treats as last access.
fn touch(path: &Path) {
    if let Ok(file) = File::options().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}
