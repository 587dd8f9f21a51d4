//! Advisory exclusive file lock with bounded acquisition.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::CacheError;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// An exclusive lock held on a lock file until dropped.
///
/// Locks are OS-level (`flock`), so they exclude other processes as well as
/// other open handles in this process.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, sleeping the calling thread between attempts.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;
        let deadline = Instant::now() + timeout;
        loop {
            if try_lock(&file, path)? {
                return Ok(Self::held(file, path));
            }
            if Instant::now() >= deadline {
                return Err(unavailable(path, timeout));
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Acquire the lock without blocking the async executor.
    pub async fn acquire_async(path: &Path, timeout: Duration) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;
        let deadline = Instant::now() + timeout;
        loop {
            if try_lock(&file, path)? {
                return Ok(Self::held(file, path));
            }
            if Instant::now() >= deadline {
                return Err(unavailable(path, timeout));
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    fn held(file: File, path: &Path) -> Self {
        debug!(path = %path.display(), "Lock acquired");
        Self {
            file,
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| CacheError::io(path, e))
}

fn try_lock(file: &File, path: &Path) -> Result<bool, CacheError> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

fn unavailable(path: &Path, timeout: Duration) -> CacheError {
    CacheError::Unavailable {
        path: path.to_path_buf(),
        timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_holder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let held = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let err = FileLock::acquire(&path, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.kind(), "cache_unavailable");

        drop(held);
        assert!(FileLock::acquire(&path, Duration::from_millis(50)).is_ok());
    }

    #[tokio::test]
    async fn test_async_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("job.lock");

        let held = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        let lock = FileLock::acquire_async(&path, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(lock.path(), path.as_path());
        release.await.unwrap();
    }
}
