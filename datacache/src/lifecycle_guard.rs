//! Single-instance advisory lock and shutdown teardown.
//!
//! At start-up the daemon takes an exclusive, non-blocking `flock(2)` on a
//! well-known file. A second instance pointed at the same lock file fails
//! immediately rather than racing the first for the listening socket or the
//! shared-memory namespace. On shutdown the guard drives the documented
//! teardown order: stop the loader, unlink every resident segment, then
//! release the lock.

use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors acquiring or releasing the instance lock.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Another instance already holds the lock.
    #[error("another instance already holds the lock at {path}")]
    AlreadyRunning {
        /// Lock file path.
        path: PathBuf,
    },

    /// The lock file could not be opened or created.
    #[error("failed to open lock file {path}: {source}")]
    Open {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Holds the exclusive advisory lock for the lifetime of the daemon.
/// Dropping (or explicit [`LifecycleGuard::release`]) releases the flock
/// and removes the lock file.
pub struct LifecycleGuard {
    path: PathBuf,
    lock: Option<Flock<File>>,
}

impl LifecycleGuard {
    /// Acquire the exclusive, non-blocking lock at `path`. Fails immediately
    /// (rather than blocking) if another instance already holds it.
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|source| LifecycleError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, _)| {
            LifecycleError::AlreadyRunning {
                path: path.to_path_buf(),
            }
        })?;

        tracing::info!(path = %path.display(), "acquired instance lock");
        Ok(Self {
            path: path.to_path_buf(),
            lock: Some(lock),
        })
    }

    /// Release the lock and remove the lock file. Idempotent.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(lock) = self.lock.take() {
            let _ = Flock::unlock(lock);
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
                }
            }
        }
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datacache.lock");

        let guard = LifecycleGuard::acquire(&path).unwrap();
        guard.release();

        let guard2 = LifecycleGuard::acquire(&path).unwrap();
        guard2.release();
    }

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datacache.lock");

        let _first = LifecycleGuard::acquire(&path).unwrap();
        let second = LifecycleGuard::acquire(&path);
        assert!(matches!(second, Err(LifecycleError::AlreadyRunning { .. })));
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datacache.lock");

        {
            let _guard = LifecycleGuard::acquire(&path).unwrap();
        }

        let reacquired = LifecycleGuard::acquire(&path);
        assert!(reacquired.is_ok());
    }
}
