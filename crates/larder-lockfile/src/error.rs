//! Error types for lockfile operations.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Lockfile operation errors.
#[derive(Error, Debug)]
pub enum LockfileError {
    /// IO error with path context.
    #[error("IO error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// JSON parsing or rendering error.
    #[error("JSON error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// Lock acquisition timeout.
    #[error("failed to acquire lock on {path} within {timeout:?}")]
    LockTimeout {
        /// Lock file path.
        path: PathBuf,
        /// Timeout duration.
        timeout: Duration,
    },

    /// Written bytes do not hash to what was meant to be written.
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityError {
        /// Expected hash.
        expected: String,
        /// Actual hash.
        actual: String,
    },

    /// Two entries share a package name.
    #[error("duplicate package '{name}' in lockfile")]
    DuplicatePackage {
        /// Package name.
        name: String,
    },

    /// Structurally invalid lockfile.
    #[error("invalid lockfile: {0}")]
    InvalidStructure(String),
}

impl LockfileError {
    /// Create an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create an invalid structure error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Check if this is a lock timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Convert into the workspace error, attributed to `path`.
    #[must_use]
    pub fn at(self, path: &Path) -> larder_core::Error {
        let path = match &self {
            Self::Io { path, .. } | Self::LockTimeout { path, .. } => path.clone(),
            _ => path.to_path_buf(),
        };
        larder_core::Error::Lockfile {
            path,
            message: self.to_string(),
        }
    }
}

impl From<LockfileError> for larder_core::Error {
    fn from(err: LockfileError) -> Self {
        err.at(Path::new(""))
    }
}

/// Result type for lockfile operations.
pub type Result<T> = std::result::Result<T, LockfileError>;
