//! Lockfile management for Larder.
//!
//! A lockfile records the outcome of the last successful resolution: one
//! [`LockEntry`] per package plus the digest of the manifest it was
//! computed for. On disk it is pretty-printed JSON with a fixed field
//! order, entries sorted by name and a trailing newline, so it diffs
//! cleanly and re-serializes byte for byte.
//!
//! [`LockfileManager`] persists it crash-safely: readers take a shared
//! advisory lock, writers an exclusive one, and content only ever reaches
//! the final path through an fsynced, re-hashed temp file and a rename.
//!
//! # Example
//!
//! ```rust,ignore
//! use larder_lockfile::{Lockfile, LockfileManager};
//!
//! let manager = LockfileManager::new("Larderfile.lock");
//! if let Some(lockfile) = manager.read()? {
//!     println!("{} packages locked", lockfile.len());
//! }
//! manager.write(&Lockfile::from_packages(*manifest.digest(), &packages)?)?;
//! ```

mod atomic;
mod error;
mod types;

pub use atomic::{AtomicReader, AtomicWriter, LOCK_TIMEOUT, WriteResult};
pub use error::{LockfileError, Result};
pub use types::{LockEntry, Lockfile};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Conventional lockfile name next to a manifest.
pub const LOCKFILE_NAME: &str = "Larderfile.lock";

/// Reads and writes one lockfile path.
#[derive(Debug, Clone)]
pub struct LockfileManager {
    path: PathBuf,
    lock_timeout: Duration,
}

impl LockfileManager {
    /// Manager for the lockfile at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Manager for [`LOCKFILE_NAME`] inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LOCKFILE_NAME))
    }

    /// Bound the wait for the advisory lock.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Lockfile path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a lockfile exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the lockfile, or `None` if there is none.
    pub fn read(&self) -> larder_core::Result<Option<Lockfile>> {
        if !self.exists() {
            debug!(path = %self.path.display(), "no lockfile");
            return Ok(None);
        }
        let reader =
            AtomicReader::new(&self.path, self.lock_timeout).map_err(|e| e.at(&self.path))?;
        let content = reader.read_string().map_err(|e| e.at(&self.path))?;
        let lockfile = Lockfile::parse(&content).map_err(|e| e.at(&self.path))?;
        debug!(path = %self.path.display(), entries = lockfile.len(), "read lockfile");
        Ok(Some(lockfile))
    }

    /// Replace the lockfile atomically.
    pub fn write(&self, lockfile: &Lockfile) -> larder_core::Result<WriteResult> {
        let json = lockfile.to_json().map_err(|e| e.at(&self.path))?;
        let mut writer =
            AtomicWriter::new(&self.path, self.lock_timeout).map_err(|e| e.at(&self.path))?;
        writer.content(json);
        let result = writer.commit().map_err(|e| e.at(&self.path))?;
        info!(
            path = %self.path.display(),
            entries = lockfile.len(),
            bytes = result.bytes_written,
            "wrote lockfile"
        );
        Ok(result)
    }

    /// Clean up after an interrupted write. Returns whether anything was
    /// removed.
    pub fn recover(&self) -> larder_core::Result<bool> {
        atomic::recover(&self.path, self.lock_timeout).map_err(|e| e.at(&self.path))
    }
}
