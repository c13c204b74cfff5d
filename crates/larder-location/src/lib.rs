//! Package locations.
//!
//! A [`LocationSpec`] says where a package comes from; [`Locations`] knows
//! how to turn one into a [`CachedPackage`] in the store. Fetching is
//! dispatched on the variant tag:
//!
//! - **Path**: validated in place, never copied
//! - **Git**: revision resolved, cloned into scratch, stored per revision
//! - **Index/API**: highest satisfying version downloaded and extracted
//!
//! All network and subprocess work goes through [`GitTransport`] and
//! [`ArchiveTransport`] so tests can substitute fakes. Every transport call
//! runs under the configured deadline; expiry surfaces as a transport error
//! and never leaves a partial directory in the store.

mod archive;
mod extract;
mod git;
mod http;
mod path;
mod transport;

pub use extract::extract_tar_gz;
pub use git::{GitCli, is_revision};
pub use http::HttpTransport;
pub use transport::{ArchiveTransport, GitTransport};

use larder_config::LarderConfig;
use larder_core::{CachedPackage, Constraint, Error, LocationSpec, Result, Version};
use larder_store::PackageStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fetch capability table for every location variant.
#[derive(Clone)]
pub struct Locations {
    git: Arc<dyn GitTransport>,
    archive: Arc<dyn ArchiveTransport>,
    timeout: Duration,
}

impl fmt::Debug for Locations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locations")
            .field("git", &self.git)
            .field("archive", &self.archive)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Locations {
    /// Locations over explicit transports.
    #[must_use]
    pub fn new(
        git: Arc<dyn GitTransport>,
        archive: Arc<dyn ArchiveTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            git,
            archive,
            timeout,
        }
    }

    /// Locations over the `git` binary and HTTP.
    pub fn from_config(config: &LarderConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(GitCli::new()),
            Arc::new(HttpTransport::new(config.fetch_timeout)?),
            config.fetch_timeout,
        ))
    }

    /// Deadline applied to each transport call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Materialize `name` from `spec` into the store.
    ///
    /// Returns the package satisfying `constraint`. A package already in the
    /// store is returned without network access whenever its identity can be
    /// known locally.
    pub async fn fetch(
        &self,
        spec: &LocationSpec,
        name: &str,
        constraint: &Constraint,
        store: &PackageStore,
    ) -> Result<CachedPackage> {
        debug!(name, location = %spec, constraint = %constraint, "fetching package");
        match spec {
            LocationSpec::Path { dir } => path::fetch(dir, name, constraint, spec),
            LocationSpec::Git { uri, reference } => {
                git::fetch(self, uri, reference.as_deref(), name, constraint, store).await
            }
            LocationSpec::Index { .. } | LocationSpec::Api { .. } => {
                archive::fetch(self, spec, name, constraint, store).await
            }
        }
    }

    /// Versions an index or API location offers for `name`, highest first.
    pub async fn available_versions(
        &self,
        spec: &LocationSpec,
        name: &str,
    ) -> Result<Vec<Version>> {
        match spec {
            LocationSpec::Index { .. } | LocationSpec::Api { .. } => {
                archive::available_versions(self, spec, name).await
            }
            LocationSpec::Path { .. } | LocationSpec::Git { .. } => Err(Error::InvalidOptions(
                format!("{spec} does not list versions; fetch it instead"),
            )),
        }
    }

    /// Run a transport future under the fetch deadline.
    pub(crate) async fn deadline<T>(
        &self,
        location: &(dyn fmt::Display + Sync),
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                Error::transport(location, format!("timed out after {:?}", self.timeout))
            })?
    }

    pub(crate) fn git(&self) -> &dyn GitTransport {
        self.git.as_ref()
    }

    pub(crate) fn archive(&self) -> &dyn ArchiveTransport {
        self.archive.as_ref()
    }
}

/// Re-tag a not-found error with the package name being fetched.
pub(crate) fn not_found_for(name: &str, err: Error) -> Error {
    match err {
        Error::NotFound { diagnostics, .. } => Error::NotFound {
            name: name.to_string(),
            diagnostics,
        },
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// A gzipped tarball holding `files` under a `prefix/` directory.
    pub fn tarball(prefix: &str, files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            let full = if prefix.is_empty() {
                (*path).to_string()
            } else {
                format!("{prefix}/{path}")
            };
            builder
                .append_data(&mut header, full, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Descriptor JSON for a package.
    pub fn descriptor(name: &str, version: &str) -> String {
        format!(r#"{{"name":"{name}","version":"{version}"}}"#)
    }
}
