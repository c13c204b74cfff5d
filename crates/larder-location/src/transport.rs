//! Narrow transport interfaces behind which all network and subprocess
//! access happens.

use async_trait::async_trait;
use larder_core::{LocationSpec, Result, Version};
use std::fmt;
use std::path::{Path, PathBuf};

/// Git operations needed to materialize a repository.
#[async_trait]
pub trait GitTransport: Send + Sync + fmt::Debug {
    /// Resolve a branch, tag or `HEAD` (when `None`) to a full revision.
    async fn resolve_ref(&self, uri: &str, reference: Option<&str>) -> Result<String>;

    /// Clone `uri` into `dest`, which must not exist yet.
    async fn clone_repo(&self, uri: &str, dest: &Path) -> Result<()>;

    /// Check out `revision` in an existing clone.
    async fn checkout(&self, repo: &Path, revision: &str) -> Result<()>;

    /// Revision currently checked out.
    async fn rev_parse(&self, repo: &Path) -> Result<String>;
}

/// Version listing and archive download for index and API locations.
#[async_trait]
pub trait ArchiveTransport: Send + Sync + fmt::Debug {
    /// Every version the location offers for `name`, in any order.
    async fn versions(&self, location: &LocationSpec, name: &str) -> Result<Vec<Version>>;

    /// Download the archive of `name` at `version` into `dest` and return its path.
    async fn download(
        &self,
        location: &LocationSpec,
        name: &str,
        version: &Version,
        dest: &Path,
    ) -> Result<PathBuf>;
}
