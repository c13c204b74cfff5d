//! Error types for Larder operations.
//!
//! Each error has:
//! - A unique error code (e.g., E0101) for easy reference and searching
//! - A clear error message explaining what went wrong
//! - An optional suggestion for how to fix the issue

use crate::requirement::ConstraintSource;
use crate::version::{Constraint, Version};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for Larder errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Package errors (E01xx)
    /// No location could supply the package
    E0101,
    /// Package contents failed validation
    E0102,
    /// Package descriptor missing or malformed
    E0103,

    // Resolution errors (E02xx)
    /// No assignment satisfies every constraint
    E0201,
    /// Same package declared with different locations
    E0202,
    /// Locked version no longer satisfies the manifest
    E0203,

    // Transport errors (E03xx)
    /// Network or subprocess failure
    E0301,

    // Manifest errors (E04xx)
    /// Duplicate requirement
    E0401,
    /// Duplicate default location
    E0402,
    /// Invalid version string
    E0403,
    /// Invalid version constraint
    E0404,
    /// Invalid install options
    E0405,

    // IO errors (E05xx)
    /// Filesystem operation failed
    E0501,

    // Lockfile errors (E07xx)
    /// Lockfile unreadable or unwritable
    E0701,

    // Configuration errors (E08xx)
    /// Invalid configuration
    E0801,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::E0101 => "E0101",
            Self::E0102 => "E0102",
            Self::E0103 => "E0103",
            Self::E0201 => "E0201",
            Self::E0202 => "E0202",
            Self::E0203 => "E0203",
            Self::E0301 => "E0301",
            Self::E0401 => "E0401",
            Self::E0402 => "E0402",
            Self::E0403 => "E0403",
            Self::E0404 => "E0404",
            Self::E0405 => "E0405",
            Self::E0501 => "E0501",
            Self::E0701 => "E0701",
            Self::E0801 => "E0801",
        }
    }

    /// Get a brief title for this error code.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::E0101 => "Package not found",
            Self::E0102 => "Invalid package files",
            Self::E0103 => "Invalid package descriptor",
            Self::E0201 => "No solution",
            Self::E0202 => "Ambiguous location",
            Self::E0203 => "Outdated locked source",
            Self::E0301 => "Transport failure",
            Self::E0401 => "Duplicate requirement",
            Self::E0402 => "Duplicate location",
            Self::E0403 => "Invalid version",
            Self::E0404 => "Invalid constraint",
            Self::E0405 => "Invalid options",
            Self::E0501 => "IO error",
            Self::E0701 => "Lockfile error",
            Self::E0801 => "Invalid configuration",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Larder.
#[derive(Error, Debug)]
pub enum Error {
    /// No location could supply the package.
    #[error("[E0101] package '{name}' not found{}", render_diagnostics(.diagnostics))]
    NotFound {
        /// Package name.
        name: String,
        /// One diagnostic per location that was consulted.
        diagnostics: Vec<String>,
    },

    /// Package contents were rejected before entering the store.
    #[error("[E0102] package '{name}' at {path} is invalid: {message}")]
    Validation {
        /// Package name.
        name: String,
        /// Directory that failed validation.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// Package descriptor missing or malformed.
    #[error("[E0103] invalid package descriptor at {path}: {message}")]
    Descriptor {
        /// Descriptor path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Resolution exhausted every candidate.
    #[error("[E0201] no version of '{name}' satisfies all constraints: {}", render_trace(.trace))]
    NoSolution {
        /// Package at which the search failed.
        name: String,
        /// Every constraint that contributed, with its requirer.
        trace: Vec<ConstraintSource>,
    },

    /// Two top-level requirements name the same package with different locations.
    #[error("[E0202] '{name}' is declared with conflicting locations: {first} and {second}")]
    AmbiguousLocation {
        /// Package name.
        name: String,
        /// First declared location.
        first: String,
        /// Second declared location.
        second: String,
    },

    /// A locked version no longer satisfies the manifest constraint.
    #[error(
        "[E0203] '{name}' is locked at {locked_version}, which does not satisfy '{constraint}'"
    )]
    OutdatedSourceConflict {
        /// Package name.
        name: String,
        /// Version recorded in the lockfile.
        locked_version: Version,
        /// Constraint now declared in the manifest.
        constraint: Constraint,
    },

    /// Network, subprocess or timeout failure.
    #[error("[E0301] transport error for {location}: {message}")]
    Transport {
        /// Location being contacted.
        location: String,
        /// Error message.
        message: String,
    },

    /// Same package declared twice within overlapping groups.
    #[error("[E0401] '{name}' is declared more than once")]
    DuplicateRequirement {
        /// Package name.
        name: String,
    },

    /// Same default location registered twice.
    #[error("[E0402] default location {location} is declared more than once")]
    DuplicateLocation {
        /// Rendered location.
        location: String,
    },

    /// Unparseable version string.
    #[error("[E0403] invalid version '{input}': {message}")]
    InvalidVersion {
        /// Offending input.
        input: String,
        /// Parser message.
        message: String,
    },

    /// Unparseable constraint string.
    #[error("[E0404] invalid constraint '{input}': {message}")]
    InvalidConstraint {
        /// Offending input.
        input: String,
        /// Parser message.
        message: String,
    },

    /// Contradictory or unknown install options.
    #[error("[E0405] invalid options: {0}")]
    InvalidOptions(String),

    /// IO error with path context.
    #[error("[E0501] io error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Lockfile could not be read or written.
    #[error("[E0701] lockfile error at {path}: {message}")]
    Lockfile {
        /// Lockfile path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("[E0801] config error: {0}")]
    Config(String),
}

fn render_diagnostics(diagnostics: &[String]) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!(" ({})", diagnostics.join("; "))
    }
}

fn render_trace(trace: &[ConstraintSource]) -> String {
    trace
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::E0101,
            Self::Validation { .. } => ErrorCode::E0102,
            Self::Descriptor { .. } => ErrorCode::E0103,
            Self::NoSolution { .. } => ErrorCode::E0201,
            Self::AmbiguousLocation { .. } => ErrorCode::E0202,
            Self::OutdatedSourceConflict { .. } => ErrorCode::E0203,
            Self::Transport { .. } => ErrorCode::E0301,
            Self::DuplicateRequirement { .. } => ErrorCode::E0401,
            Self::DuplicateLocation { .. } => ErrorCode::E0402,
            Self::InvalidVersion { .. } => ErrorCode::E0403,
            Self::InvalidConstraint { .. } => ErrorCode::E0404,
            Self::InvalidOptions(_) => ErrorCode::E0405,
            Self::Io { .. } => ErrorCode::E0501,
            Self::Lockfile { .. } => ErrorCode::E0701,
            Self::Config(_) => ErrorCode::E0801,
        }
    }

    /// Suggested remedy, when one exists.
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::OutdatedSourceConflict { name, .. } => {
                Some(format!("run `larder update {name}` to re-resolve it"))
            }
            Self::NoSolution { name, .. } => Some(format!(
                "relax the constraints on '{name}' or on the packages that require it"
            )),
            Self::NotFound { .. } => {
                Some("check the package name and the configured locations".to_string())
            }
            Self::Transport { .. } => Some("the operation may succeed if retried".to_string()),
            Self::Validation { .. } => {
                Some("rename or remove the offending files in the package".to_string())
            }
            Self::AmbiguousLocation { name, .. } => {
                Some(format!("declare a single location for '{name}'"))
            }
            _ => None,
        }
    }

    /// Only transport failures are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// True for `NotFound`, which lets location chains fall through.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Create an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a not-found error with a single diagnostic.
    #[must_use]
    pub fn not_found(name: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            diagnostics: vec![diagnostic.into()],
        }
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(location: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Transport {
            location: location.to_string(),
            message: message.into(),
        }
    }

    /// Create a descriptor error.
    #[must_use]
    pub fn descriptor(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Descriptor {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Format the error with its code title and suggestion for display.
    #[must_use]
    pub fn display_with_suggestion(&self) -> String {
        let mut output = format!("{}: {self}", self.code().title());
        if let Some(suggestion) = self.suggestion() {
            output.push_str(&format!("\n  help: {suggestion}"));
        }
        output
    }
}

/// Result type for Larder operations.
pub type Result<T> = std::result::Result<T, Error>;
