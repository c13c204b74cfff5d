//! Environment variable overrides.

use crate::error::{ConfigError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables Larder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LarderEnvVar {
    /// `LARDER_PATH` - store root directory.
    Path,
    /// `LARDER_FETCH_TIMEOUT` - per-fetch deadline in seconds.
    FetchTimeout,
    /// `LARDER_MAX_CONCURRENCY` - concurrent fetch limit.
    MaxConcurrency,
}

impl LarderEnvVar {
    /// Get the environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "LARDER_PATH",
            Self::FetchTimeout => "LARDER_FETCH_TIMEOUT",
            Self::MaxConcurrency => "LARDER_MAX_CONCURRENCY",
        }
    }

    /// Look the variable up through `lookup`, ignoring blank values.
    pub fn get_from(self, lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
        lookup(self.as_str()).filter(|v| !v.trim().is_empty())
    }

    /// Get as path.
    pub fn path_from(self, lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        self.get_from(lookup).map(PathBuf::from)
    }

    /// Get as a positive integer.
    pub fn usize_from(self, lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<usize>> {
        self.get_from(lookup)
            .map(|raw| {
                raw.trim().parse::<usize>().map_err(|e| ConfigError::EnvError {
                    var: self.as_str().to_string(),
                    message: format!("'{raw}' is not a whole number: {e}"),
                })
            })
            .transpose()
    }

    /// Get as a duration in whole seconds.
    pub fn seconds_from(
        self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Duration>> {
        Ok(self
            .usize_from(lookup)?
            .map(|secs| Duration::from_secs(secs as u64)))
    }
}
