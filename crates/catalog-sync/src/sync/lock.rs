//! Lock file guarding a single sync run
//!
//! The lock is a JSON file created with `create_new`, so only one process can win the
//! create. A lock older than the stale threshold is assumed to belong to a crashed run
//! and is taken over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// Lock file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique id of the run holding the lock
    pub holder_id: String,
    /// Process id of the holder
    pub pid: u32,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            holder_id: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn age(&self) -> Duration {
        (Utc::now() - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Held run lock, released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// Take the lock at `path`, replacing a lock older than `stale_after`
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::try_create(path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let (holder, age) = Self::inspect(path)?;
        if age < stale_after {
            return Err(Error::AlreadyRunning(holder));
        }

        tracing::warn!(
            "Taking over stale sync lock held by {} ({}s old): {}",
            holder,
            age.as_secs(),
            path.display()
        );
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Another process may have taken over in between
        Self::try_create(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                Error::AlreadyRunning(format!("another run ({})", path.display()))
            } else {
                e.into()
            }
        })
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let info = LockInfo::new();
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let body = serde_json::to_vec_pretty(&info)?;
        file.write_all(&body)?;
        file.sync_all()?;
        tracing::debug!("Acquired sync lock {} as {}", path.display(), info.holder_id);
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    /// Holder description and age of an existing lock file
    ///
    /// An unreadable lock falls back to the file's modification time.
    fn inspect(path: &Path) -> Result<(String, Duration)> {
        let parsed = std::fs::read(path)
            .ok()
            .and_then(|body| serde_json::from_slice::<LockInfo>(&body).ok());
        if let Some(info) = parsed {
            return Ok((format!("{} (pid {})", info.holder_id, info.pid), info.age()));
        }

        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            // Released while we looked
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SystemTime::UNIX_EPOCH,
            Err(e) => return Err(e.into()),
        };
        let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
        Ok(("unknown holder".to_string(), age))
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Released sync lock {}", self.path.display()),
            Err(e) => tracing::warn!("Failed to release sync lock {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIX_HOURS: Duration = Duration::from_secs(6 * 3600);

    #[test]
    fn test_second_holder_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let first = RunLock::acquire(&path, SIX_HOURS).unwrap();
        let err = RunLock::acquire(&path, SIX_HOURS).unwrap_err();

        assert!(matches!(err, Error::AlreadyRunning(ref holder) if holder.contains(&first.info().holder_id)));
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sync.lock");

        {
            let lock = RunLock::acquire(&path, SIX_HOURS).unwrap();
            assert!(path.exists());
            let stored: LockInfo = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
            assert_eq!(&stored, lock.info());
        }

        assert!(!path.exists());
        RunLock::acquire(&path, SIX_HOURS).unwrap();
    }

    #[test]
    fn test_stale_lock_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let stale = LockInfo {
            holder_id: "crashed-run".to_string(),
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::hours(7),
        };
        std::fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();

        let lock = RunLock::acquire(&path, SIX_HOURS).unwrap();

        assert_ne!(lock.info().holder_id, "crashed-run");
    }

    #[test]
    fn test_unreadable_lock_uses_mtime() {
        let dir = tempfile::tempdir().unwrap();
        crate::test_support::write_aged(dir.path(), "fresh.lock", "garbage", 0);
        crate::test_support::write_aged(dir.path(), "old.lock", "garbage", 7 * 3600);

        assert!(matches!(
            RunLock::acquire(&dir.path().join("fresh.lock"), SIX_HOURS),
            Err(Error::AlreadyRunning(_))
        ));
        assert!(RunLock::acquire(&dir.path().join("old.lock"), SIX_HOURS).is_ok());
    }
}
