//! At-most-one-writer primitive (spec.md §4.6): an atomic create-if-absent
//! lock object at a record path, grounded on `courier`'s idempotent-write
//! pattern and `hurry`'s temp-then-rename lock file.
//!
//! Unlike a mutex, failing to acquire this lock is not an error the caller
//! retries on — spec.md §4.6 is explicit that a collision means the save is
//! skipped, never retried.

use std::path::{Path, PathBuf};

use tokio::task::spawn_blocking;
use tracing::instrument;

use buildcache_core::error::{CacheError, Result};

/// Whether a [`WriteLock::acquire`] call actually took the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    AlreadyHeld,
}

/// A lock file living alongside a record directory, released on drop.
pub struct WriteLock {
    path: PathBuf,
    held: bool,
}

impl WriteLock {
    /// Attempt to create `{record_dir}/.lock` with `O_EXCL` semantics. If the
    /// file already exists, the record is being (or was) written by another
    /// writer and the caller must skip its save rather than wait.
    #[instrument]
    pub async fn acquire(record_dir: &Path) -> Result<(Self, LockOutcome)> {
        let lock_path = record_dir.join(".lock");
        let dir = record_dir.to_path_buf();

        spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| CacheError::StoreIo {
                op: "mkdir",
                path: dir.display().to_string(),
                source: e,
            })
        })
        .await
        .map_err(|e| CacheError::StoreIo { op: "join", path: record_dir.display().to_string(), source: std::io::Error::other(e) })??;

        let path_for_blocking = lock_path.clone();
        let result = spawn_blocking(move || {
            std::fs::OpenOptions::new().write(true).create_new(true).open(&path_for_blocking)
        })
        .await
        .map_err(|e| CacheError::StoreIo { op: "join", path: lock_path.display().to_string(), source: std::io::Error::other(e) })?;

        match result {
            Ok(_) => Ok((Self { path: lock_path, held: true }, LockOutcome::Acquired)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok((Self { path: lock_path, held: false }, LockOutcome::AlreadyHeld))
            }
            Err(e) => Err(CacheError::StoreIo { op: "create-lock", path: lock_path.display().to_string(), source: e }),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if self.held {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_writer_sees_already_held() {
        let dir = tempfile::tempdir().unwrap();
        let record_dir = dir.path().join("record");

        let (first_lock, first_outcome) = WriteLock::acquire(&record_dir).await.unwrap();
        assert_eq!(first_outcome, LockOutcome::Acquired);

        let (_second_lock, second_outcome) = WriteLock::acquire(&record_dir).await.unwrap();
        assert_eq!(second_outcome, LockOutcome::AlreadyHeld);

        drop(first_lock);
    }

    #[tokio::test]
    async fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let record_dir = dir.path().join("record");

        let (lock, outcome) = WriteLock::acquire(&record_dir).await.unwrap();
        assert_eq!(outcome, LockOutcome::Acquired);
        drop(lock);

        let (_lock2, outcome2) = WriteLock::acquire(&record_dir).await.unwrap();
        assert_eq!(outcome2, LockOutcome::Acquired);
    }
}
