//! Temporary project directories wired to fake transports.

use crate::fakes::{FakeGit, FakeIndex};
use crate::fixtures::PackageFixture;
use larder_config::LarderConfig;
use larder_location::Locations;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fetch deadline used by test projects.
pub const TEST_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A throwaway project: a working directory, a private store root and a
/// pair of fake remotes.
///
/// Everything is removed when the project is dropped.
#[derive(Debug)]
pub struct TempProject {
    dir: TempDir,
    /// Fake git hosting.
    pub git: Arc<FakeGit>,
    /// Fake index and API server.
    pub index: Arc<FakeIndex>,
}

impl TempProject {
    /// A fresh project with empty remotes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
            git: Arc::new(FakeGit::new()),
            index: Arc::new(FakeIndex::new()),
        }
    }

    /// Project root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store root, private to this project.
    #[must_use]
    pub fn store_root(&self) -> PathBuf {
        self.path().join(".larder")
    }

    /// Configuration rooted at [`Self::store_root`] with no default locations.
    #[must_use]
    pub fn config(&self) -> LarderConfig {
        LarderConfig::at_root(self.store_root())
            .with_fetch_timeout(TEST_FETCH_TIMEOUT)
            .with_default_locations(Vec::new())
    }

    /// Locations over the fake remotes.
    #[must_use]
    pub fn locations(&self) -> Locations {
        Locations::new(self.git.clone(), self.index.clone(), TEST_FETCH_TIMEOUT)
    }

    /// Where the project's lockfile lives.
    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        self.path().join("Larderfile.lock")
    }

    /// Write a local package under `packages/<name>` and return its directory.
    pub fn local_package(&self, fixture: &PackageFixture) -> PathBuf {
        let dir = self.path().join("packages").join(&fixture.name);
        fixture.write_to(&dir).expect("write local package")
    }

    /// Total calls made to either fake remote.
    #[must_use]
    pub fn remote_calls(&self) -> usize {
        self.git.calls() + self.index.calls()
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_packages_land_inside_the_project() {
        let project = TempProject::new();
        let dir = project.local_package(&PackageFixture::new("app", "0.1.0"));
        assert!(dir.starts_with(project.path()));
        assert!(dir.join("recipes/default.rb").is_file());
        assert_eq!(project.remote_calls(), 0);
        assert!(project.config().default_locations.is_empty());
    }
}
