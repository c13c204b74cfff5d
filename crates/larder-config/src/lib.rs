//! Runtime configuration for Larder.
//!
//! [`LarderConfig`] is the explicit context object handed to the store,
//! locations, resolver and installer. It is built from defaults, optionally
//! overridden by environment variables, and never consulted as global state.

mod env;
mod error;

pub use env::LarderEnvVar;
pub use error::{ConfigError, Result};

use larder_core::LocationSpec;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Public community index used when a manifest names no default location.
pub const DEFAULT_INDEX: &str = "https://supermarket.chef.io/api/v1/cookbooks";

/// Directory name under the home directory.
const ROOT_DIR_NAME: &str = ".larder";

/// Larder configuration.
#[derive(Debug, Clone)]
pub struct LarderConfig {
    /// Store root; packages, scratch space and locks live beneath it.
    pub root: PathBuf,
    /// Deadline for a single transport operation.
    pub fetch_timeout: Duration,
    /// How long to wait for a contended store or lockfile lock.
    pub lock_timeout: Duration,
    /// Upper bound on concurrent fetches.
    pub max_concurrent_fetches: usize,
    /// Upper bound on resolver backtracks before giving up.
    pub max_backtracks: usize,
    /// Locations consulted for requirements without one.
    pub default_locations: Vec<LocationSpec>,
}

impl LarderConfig {
    /// Configuration rooted at `root` with default settings.
    #[must_use]
    pub fn at_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fetch_timeout: Duration::from_secs(300),
            lock_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 8,
            max_backtracks: 10_000,
            default_locations: vec![LocationSpec::index(DEFAULT_INDEX)],
        }
    }

    /// Configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = match LarderEnvVar::Path.path_from(&lookup) {
            Some(root) => root,
            None => Self::default_root()?,
        };
        let mut config = Self::at_root(root);
        if let Some(timeout) = LarderEnvVar::FetchTimeout.seconds_from(&lookup)? {
            config.fetch_timeout = timeout;
        }
        if let Some(n) = LarderEnvVar::MaxConcurrency.usize_from(&lookup)? {
            config.max_concurrent_fetches = n;
        }
        config.validate()?;
        debug!(root = %config.root.display(), "loaded configuration");
        Ok(config)
    }

    /// `~/.larder`.
    pub fn default_root() -> Result<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(ROOT_DIR_NAME))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    /// Set the fetch deadline.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n;
        self
    }

    /// Replace the default locations.
    #[must_use]
    pub fn with_default_locations(mut self, locations: Vec<LocationSpec>) -> Self {
        self.default_locations = locations;
        self
    }

    /// Reject settings that would stall every operation.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "fetch_timeout",
                "must be greater than zero",
                "use a timeout of at least one second",
            ));
        }
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "lock_timeout",
                "must be greater than zero",
                "use a timeout of at least one second",
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_fetches",
                "must be at least 1",
                "set LARDER_MAX_CONCURRENCY to a positive number",
            ));
        }
        Ok(())
    }

    /// Root of the package store.
    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Scratch space on the store's filesystem.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Per-destination lock files.
    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// The store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
