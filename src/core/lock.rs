//! Store locking.
//!
//! Mutations of a store are serialized with a lock file created via
//! `O_CREAT | O_EXCL`. The same mechanism excludes other threads and other
//! processes. Acquisition polls until a deadline and then fails with
//! [`StoreError::LockTimeout`] instead of blocking forever.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::{Result, StoreError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A lock file guarding one store directory.
#[derive(Debug, Clone)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
}

/// Held lock. Releases on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl StoreLock {
    /// Lock file at `path`, waiting at most `timeout` on contention.
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, polling until the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` if another holder keeps the lock
    /// past the deadline, or `StoreError::WriteFailed` on I/O errors.
    pub fn acquire(&self) -> Result<LockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::WriteFailed)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    trace!(path = %self.path.display(), "lock acquired");
                    return Ok(LockGuard {
                        path: self.path.clone(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        warn!(
                            path = %self.path.display(),
                            waited_ms = waited.as_millis() as u64,
                            "lock acquisition timed out"
                        );
                        return Err(StoreError::LockTimeout {
                            path: self.path.clone(),
                            waited_ms: waited.as_millis() as u64,
                        }
                        .into());
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(StoreError::WriteFailed(e).into()),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "failed to remove lock file");
        } else {
            trace!(path = %self.path.display(), "lock released");
        }
    }
}
