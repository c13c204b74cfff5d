//! Per-destination exclusive locks.

use fs2::FileExt;
use larder_core::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Poll interval while a lock is contended.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An exclusive lock on a store destination, released on drop.
#[derive(Debug)]
pub struct DestinationLock {
    path: PathBuf,
    _file: File,
}

impl DestinationLock {
    /// Acquire the lock, polling until `timeout` elapses.
    ///
    /// Blocks the calling thread; async callers go through
    /// [`DestinationLock::acquire_async`].
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        let start = Instant::now();
        loop {
            // Explicitly use fs2::FileExt to avoid std File method shadowing
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(path = %path.display(), "acquired destination lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        _file: file,
                    });
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        return Err(Error::Io {
                            path: path.to_path_buf(),
                            message: format!("timed out after {timeout:?} waiting for lock"),
                        });
                    }
                    trace!(path = %path.display(), "destination lock contended");
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(Error::io(path, e)),
            }
        }
    }

    /// Acquire the lock on a blocking thread.
    pub async fn acquire_async(path: PathBuf, timeout: Duration) -> Result<Self> {
        let display = path.clone();
        tokio::task::spawn_blocking(move || Self::acquire(&path, timeout))
            .await
            .map_err(|e| Error::Io {
                path: display,
                message: format!("lock task failed: {e}"),
            })?
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_holder_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locks/nginx-1.0.0.lock");
        let held = DestinationLock::acquire(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(held.path(), path);

        let err = DestinationLock::acquire(&path, Duration::from_millis(50)).unwrap_err();
        assert!(err.to_string().contains("timed out"));

        drop(held);
        assert!(DestinationLock::acquire(&path, Duration::from_millis(50)).is_ok());
    }
}
