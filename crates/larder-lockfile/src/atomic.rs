//! Lockfile I/O that never exposes a half-written file.
//!
//! Writers hold an exclusive fs2 lock on a `.lck` sibling and publish by
//! renaming a hashed, fsynced `.tmp` sibling over the target. Readers take
//! the shared lock. A `.tmp` left by a crash is discarded by [`recover`].

use crate::error::{LockfileError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const TEMP_SUFFIX: &str = ".tmp";
const LOCK_SUFFIX: &str = ".lck";

/// Default lock acquisition timeout.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// `path` with `suffix` appended to its file name.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Path of the advisory lock guarding `target`.
pub(crate) fn lock_path(target: &Path) -> PathBuf {
    sibling(target, LOCK_SUFFIX)
}

/// Path of the temp file an in-flight write to `target` uses.
pub(crate) fn temp_path(target: &Path) -> PathBuf {
    sibling(target, TEMP_SUFFIX)
}

/// Stages new lockfile bytes and swaps them in on [`commit`](Self::commit).
///
/// The exclusive lock is held from construction until the writer drops.
#[derive(Debug)]
pub struct AtomicWriter {
    target: PathBuf,
    temp_path: PathBuf,
    _lock_file: File,
    content: Option<Vec<u8>>,
    expected_hash: Option<blake3::Hash>,
}

impl AtomicWriter {
    /// Create a writer for `path`, waiting up to `timeout` for the lock.
    pub fn new(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let target = path.as_ref().to_path_buf();
        debug!(target = %target.display(), "creating atomic writer");
        let lock_file = acquire_lock(&lock_path(&target), LockMode::Exclusive, timeout)?;

        Ok(Self {
            temp_path: temp_path(&target),
            target,
            _lock_file: lock_file,
            content: None,
            expected_hash: None,
        })
    }

    /// Set content to write.
    pub fn content(&mut self, content: impl Into<Vec<u8>>) -> &mut Self {
        let bytes = content.into();
        self.expected_hash = Some(blake3::hash(&bytes));
        self.content = Some(bytes);
        self
    }

    /// Execute the atomic write.
    pub fn commit(mut self) -> Result<WriteResult> {
        let content = self
            .content
            .take()
            .ok_or_else(|| LockfileError::invalid("no content provided for atomic write"))?;
        let expected_hash = self.expected_hash.take().unwrap_or_else(|| blake3::hash(&content));

        if let Some(parent) = self.target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| LockfileError::io(parent, e))?;
            }
        }

        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.temp_path)
                .map_err(|e| LockfileError::io(&self.temp_path, e))?;
            temp_file
                .write_all(&content)
                .map_err(|e| LockfileError::io(&self.temp_path, e))?;
            temp_file
                .sync_all()
                .map_err(|e| LockfileError::io(&self.temp_path, e))?;
        }

        let actual_hash = hash_file(&self.temp_path)?;
        if actual_hash != expected_hash {
            let _ = fs::remove_file(&self.temp_path);
            return Err(LockfileError::IntegrityError {
                expected: expected_hash.to_hex().to_string(),
                actual: actual_hash.to_hex().to_string(),
            });
        }
        trace!("temp file integrity verified");

        let had_existing = self.target.exists();
        fs::rename(&self.temp_path, &self.target)
            .map_err(|e| LockfileError::io(&self.target, e))?;

        #[cfg(unix)]
        if let Some(parent) = self.target.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(target = %self.target.display(), bytes = content.len(), "atomic write completed");
        Ok(WriteResult {
            path: self.target.clone(),
            bytes_written: content.len(),
            hash: expected_hash.to_hex().to_string(),
            had_existing,
        })
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if self.temp_path.exists() {
            warn!(temp = %self.temp_path.display(), "cleaning up unfinished temp file");
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Result of a successful atomic write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Path that was written.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes_written: usize,
    /// BLAKE3 hash of the content.
    pub hash: String,
    /// Whether a file was replaced.
    pub had_existing: bool,
}

/// File reader holding a shared lock, so it never observes a write halfway.
#[derive(Debug)]
pub struct AtomicReader {
    target: PathBuf,
    _lock_file: File,
}

impl AtomicReader {
    /// Create a reader for `path`, waiting up to `timeout` for the lock.
    pub fn new(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let target = path.as_ref().to_path_buf();
        let lock_file = acquire_lock(&lock_path(&target), LockMode::Shared, timeout)?;
        Ok(Self {
            target,
            _lock_file: lock_file,
        })
    }

    /// Read the file as UTF-8.
    pub fn read_string(&self) -> Result<String> {
        let mut file = File::open(&self.target).map_err(|e| LockfileError::io(&self.target, e))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| LockfileError::io(&self.target, e))?;
        Ok(content)
    }
}

/// Remove a temp file left by an interrupted write to `target`.
///
/// Takes the exclusive lock first so an in-flight write is never disturbed.
/// Returns whether anything was removed.
pub fn recover(target: &Path, timeout: Duration) -> Result<bool> {
    let temp = temp_path(target);
    if !temp.exists() {
        return Ok(false);
    }
    let _lock = acquire_lock(&lock_path(target), LockMode::Exclusive, timeout)?;
    match fs::remove_file(&temp) {
        Ok(()) => {
            warn!(temp = %temp.display(), "removed orphaned temp file");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockfileError::io(&temp, e)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Acquire an advisory lock with timeout.
fn acquire_lock(path: &Path, mode: LockMode, timeout: Duration) -> Result<File> {
    use std::io::ErrorKind;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| LockfileError::io(path, e))?;
        }
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| LockfileError::io(path, e))?;

    let start = Instant::now();
    loop {
        // Explicitly use the fs2 trait methods to avoid std File method shadowing
        let attempt = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        match attempt {
            Ok(()) => {
                trace!(path = %path.display(), ?mode, "acquired lock");
                return Ok(file);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() > timeout {
                    return Err(LockfileError::LockTimeout {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(LockfileError::io(path, e)),
        }
    }
}

fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let mut file = File::open(path).map_err(|e| LockfileError::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| LockfileError::io(path, e))?;
    Ok(hasher.finalize())
}
