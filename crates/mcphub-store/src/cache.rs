//! Time-bounded, cross-process cache of entity status.
//!
//! Probing an entity (inspecting a container image, asking the host CLI what
//! is registered) is slow, so results are kept in one JSON file shared by
//! every mcphub process on the host. Each access holds an exclusive lock on
//! a sidecar `.lock` file; the data file itself is replaced atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mcphub_core::EntityStatus;

use crate::atomic::write_atomic;
use crate::error::CacheError;
use crate::lock::FileLock;

/// Entries older than this are treated as absent.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// How long an access waits for the lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// One cached status observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub computed_status: EntityStatus,
    pub computed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let age = now.signed_duration_since(self.computed_at);
        age >= chrono::Duration::zero() && age < ttl
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    statuses: BTreeMap<String, CacheEntry>,
}

/// Read-through status cache backed by a single shared file.
#[derive(Debug, Clone)]
pub struct StatusCache {
    path: PathBuf,
    lock_path: PathBuf,
    ttl: Duration,
    lock_timeout: Duration,
}

impl StatusCache {
    /// Create a cache stored at `path` with the default TTL and lock timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_name),
            path,
            ttl: DEFAULT_TTL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Builder method to set the entry time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builder method to set the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached status for `entity_name`, computing and storing it
    /// on a miss.
    ///
    /// Cache failures never reach the caller: if the lock cannot be taken
    /// the status is computed fresh and not stored. Errors from `compute`
    /// are returned as-is and leave the cache unchanged.
    pub fn get<F, E>(&self, entity_name: &str, compute: F) -> Result<EntityStatus, E>
    where
        F: FnOnce() -> Result<EntityStatus, E>,
    {
        match self.lookup(entity_name) {
            Ok(Some(status)) => {
                debug!(entity = %entity_name, status = %status, "Status cache hit");
                return Ok(status);
            }
            Ok(None) => {
                debug!(entity = %entity_name, "Status cache miss");
            }
            Err(e) => {
                warn!(entity = %entity_name, error = %e, "Status cache unavailable, computing uncached");
                return compute();
            }
        }

        let status = compute()?;
        if let Err(e) = self.store(entity_name, status) {
            warn!(entity = %entity_name, error = %e, "Failed to store status in cache");
        }
        Ok(status)
    }

    /// Fresh cached status, if any.
    pub fn lookup(&self, entity_name: &str) -> Result<Option<EntityStatus>, CacheError> {
        let _lock = self.lock()?;
        let now = Utc::now();
        Ok(self
            .read_file()
            .statuses
            .get(entity_name)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.computed_status))
    }

    /// Record `status` for `entity_name` with the current timestamp.
    ///
    /// Entries of other entities older than both this handle's TTL and
    /// `DEFAULT_TTL` are dropped in the same write, so a short-lived handle
    /// never evicts what default readers still consider fresh.
    pub fn store(&self, entity_name: &str, status: EntityStatus) -> Result<(), CacheError> {
        let _lock = self.lock()?;
        let now = Utc::now();
        let keep_for = self.ttl.max(DEFAULT_TTL);
        let mut file = self.read_file();
        file.statuses.retain(|_, entry| entry.is_fresh(keep_for, now));
        file.statuses.insert(
            entity_name.to_string(),
            CacheEntry {
                computed_status: status,
                computed_at: now,
            },
        );
        self.write_file(&file)
    }

    /// Remove the entry for `entity_name`. Returns whether one existed.
    pub fn invalidate(&self, entity_name: &str) -> Result<bool, CacheError> {
        let _lock = self.lock()?;
        let mut file = self.read_file();
        let removed = file.statuses.remove(entity_name).is_some();
        if removed {
            self.write_file(&file)?;
            debug!(entity = %entity_name, "Status cache entry invalidated");
        }
        Ok(removed)
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) -> Result<(), CacheError> {
        let _lock = self.lock()?;
        self.write_file(&CacheFile::default())?;
        debug!(path = %self.path.display(), "Status cache cleared");
        Ok(())
    }

    /// All entries currently on disk, fresh or not.
    pub fn entries(&self) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
        let _lock = self.lock()?;
        Ok(self.read_file().statuses)
    }

    fn lock(&self) -> Result<FileLock, CacheError> {
        FileLock::acquire(&self.lock_path, self.lock_timeout)
    }

    /// Read the cache file; a missing or unparsable file is an empty cache.
    fn read_file(&self) -> CacheFile {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return CacheFile::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable status cache, treating as empty");
                return CacheFile::default();
            }
        };
        if content.trim().is_empty() {
            return CacheFile::default();
        }
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Corrupt status cache, treating as empty");
            CacheFile::default()
        })
    }

    fn write_file(&self, file: &CacheFile) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(file)?;
        write_atomic(&self.path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &AtomicUsize, status: EntityStatus) -> Result<EntityStatus, Infallible> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(status)
    }

    #[test]
    fn test_hit_within_ttl_computes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatusCache::new(dir.path().join("status_cache.json"));
        let calls = AtomicUsize::new(0);

        let a = cache.get("boltz", || counting(&calls, EntityStatus::Installed)).unwrap();
        let b = cache.get("boltz", || counting(&calls, EntityStatus::Both)).unwrap();

        assert_eq!(a, EntityStatus::Installed);
        assert_eq!(b, EntityStatus::Installed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_entry_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatusCache::new(dir.path().join("status_cache.json"))
            .with_ttl(Duration::from_millis(50));
        let calls = AtomicUsize::new(0);

        cache.get("boltz", || counting(&calls, EntityStatus::Installed)).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        let status = cache.get("boltz", || counting(&calls, EntityStatus::Both)).unwrap();

        assert_eq!(status, EntityStatus::Both);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_compute_error_is_returned_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatusCache::new(dir.path().join("status_cache.json"));

        let err = cache
            .get("boltz", || Err::<EntityStatus, _>("docker not running"))
            .unwrap_err();
        assert_eq!(err, "docker not running");
        assert_eq!(cache.lookup("boltz").unwrap(), None);

        // the lock was released on the error path
        assert!(cache.store("boltz", EntityStatus::Installed).is_ok());
    }

    #[test]
    fn test_corrupt_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_cache.json");
        fs::write(&path, "{ not json").unwrap();
        let cache = StatusCache::new(&path);
        let calls = AtomicUsize::new(0);

        let status = cache.get("uniprot", || counting(&calls, EntityStatus::Both)).unwrap();
        assert_eq!(status, EntityStatus::Both);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["statuses"]["uniprot"]["computed_status"], "BOTH");
    }

    #[test]
    fn test_lock_contention_falls_back_to_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_cache.json");
        let cache = StatusCache::new(&path).with_lock_timeout(Duration::from_millis(20));
        let calls = AtomicUsize::new(0);

        let _held = FileLock::acquire(&cache.lock_path, Duration::from_millis(100)).unwrap();
        for _ in 0..2 {
            let status = cache.get("boltz", || counting(&calls, EntityStatus::Installed)).unwrap();
            assert_eq!(status, EntityStatus::Installed);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            cache.invalidate("boltz"),
            Err(CacheError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatusCache::new(dir.path().join("status_cache.json"));
        let calls = AtomicUsize::new(0);

        cache.get("a", || counting(&calls, EntityStatus::Installed)).unwrap();
        cache.get("b", || counting(&calls, EntityStatus::Installed)).unwrap();
        assert!(cache.invalidate("a").unwrap());
        assert!(!cache.invalidate("a").unwrap());
        cache.get("a", || counting(&calls, EntityStatus::Both)).unwrap();
        cache.get("b", || counting(&calls, EntityStatus::Both)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache.invalidate_all().unwrap();
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_cold_cache_leaves_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_cache.json");
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    let cache = StatusCache::new(path);
                    let name = format!("entity-{}", i % 3);
                    cache
                        .get(&name, || {
                            std::thread::sleep(Duration::from_millis(5));
                            counting(&calls, EntityStatus::Installed)
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), EntityStatus::Installed);
        }

        let content = fs::read_to_string(&path).unwrap();
        let parsed: CacheFile = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.statuses.len(), 3);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }
}
