//! In-memory fakes of the git and archive transports.
//!
//! Both fakes count every call so tests can assert that a run stayed
//! entirely local, and both can be switched offline to turn any remote
//! access into a transport error.

use crate::fixtures::PackageFixture;
use async_trait::async_trait;
use larder_core::{Error, LocationSpec, Result, Version};
use larder_location::{ArchiveTransport, GitTransport};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::trace;

/// Where a fake clone remembers its upstream.
const ORIGIN_FILE: &str = ".git/FAKE_ORIGIN";
const HEAD_FILE: &str = ".git/HEAD";

// ============================================================================
// Archive index
// ============================================================================

/// Fake index/API server keyed by endpoint.
#[derive(Debug, Default)]
pub struct FakeIndex {
    packages: Mutex<BTreeMap<(String, String), BTreeMap<Version, PackageFixture>>>,
    listings: AtomicUsize,
    downloads: AtomicUsize,
    offline: AtomicBool,
    down: Mutex<BTreeSet<String>>,
}

impl FakeIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a package version at `endpoint`.
    pub fn publish(&self, endpoint: &str, fixture: PackageFixture) {
        let version = Version::parse(&fixture.version).expect("fixture version parses");
        self.packages
            .lock()
            .entry((endpoint.to_string(), fixture.name.clone()))
            .or_default()
            .insert(version, fixture);
    }

    /// Remove a published version.
    pub fn yank(&self, endpoint: &str, name: &str, version: &str) {
        let version = Version::parse(version).expect("version parses");
        if let Some(versions) = self
            .packages
            .lock()
            .get_mut(&(endpoint.to_string(), name.to_string()))
        {
            versions.remove(&version);
        }
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make calls to one endpoint fail with a transport error.
    pub fn set_endpoint_offline(&self, endpoint: &str, offline: bool) {
        let mut down = self.down.lock();
        if offline {
            down.insert(endpoint.to_string());
        } else {
            down.remove(endpoint);
        }
    }

    /// Number of version listings served.
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    /// Number of archives served.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Total calls of either kind.
    pub fn calls(&self) -> usize {
        self.listings() + self.downloads()
    }

    fn endpoint(location: &LocationSpec) -> Result<&str> {
        location
            .endpoint()
            .ok_or_else(|| Error::InvalidOptions(format!("{location} has no endpoint")))
    }

    fn check_online(&self, location: &LocationSpec) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::transport(location, "network is unreachable"));
        }
        if location
            .endpoint()
            .is_some_and(|endpoint| self.down.lock().contains(endpoint))
        {
            return Err(Error::transport(location, "endpoint is down"));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveTransport for FakeIndex {
    async fn versions(&self, location: &LocationSpec, name: &str) -> Result<Vec<Version>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.check_online(location)?;
        let endpoint = Self::endpoint(location)?;
        let packages = self.packages.lock();
        match packages.get(&(endpoint.to_string(), name.to_string())) {
            Some(versions) if !versions.is_empty() => Ok(versions.keys().cloned().collect()),
            _ => Err(Error::not_found(
                name,
                format!("{location} has no package '{name}'"),
            )),
        }
    }

    async fn download(
        &self,
        location: &LocationSpec,
        name: &str,
        version: &Version,
        dest: &Path,
    ) -> Result<PathBuf> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.check_online(location)?;
        let endpoint = Self::endpoint(location)?;
        let archive = self
            .packages
            .lock()
            .get(&(endpoint.to_string(), name.to_string()))
            .and_then(|versions| versions.get(version))
            .map(PackageFixture::tarball)
            .ok_or_else(|| Error::not_found(name, format!("{location} has no {name} {version}")))?;

        let path = dest.join(format!("{name}-{version}.tar.gz"));
        fs::write(&path, archive).map_err(|e| Error::io(&path, e))?;
        trace!(name, version = %version, "served fake archive");
        Ok(path)
    }
}

// ============================================================================
// Git
// ============================================================================

#[derive(Debug, Default)]
struct FakeRepo {
    refs: BTreeMap<String, String>,
    head: Option<String>,
    revisions: BTreeMap<String, PackageFixture>,
}

/// Fake git hosting keyed by clone URI.
#[derive(Debug, Default)]
pub struct FakeGit {
    repos: Mutex<BTreeMap<String, FakeRepo>>,
    resolves: AtomicUsize,
    clones: AtomicUsize,
    offline: AtomicBool,
}

impl FakeGit {
    /// No repositories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit `fixture` on `branch` of `uri` and return the new revision.
    ///
    /// The first branch committed to becomes `HEAD`, as does `main`.
    pub fn commit(&self, uri: &str, branch: &str, fixture: PackageFixture) -> String {
        let mut repos = self.repos.lock();
        let repo = repos.entry(uri.to_string()).or_default();
        let seed = format!("{uri}\0{branch}\0{}\0{}", repo.revisions.len(), fixture.descriptor());
        let revision = blake3::hash(seed.as_bytes()).to_hex()[..40].to_string();

        repo.revisions.insert(revision.clone(), fixture);
        repo.refs.insert(branch.to_string(), revision.clone());
        if repo.head.is_none() || branch == "main" {
            repo.head = Some(revision.clone());
        }
        revision
    }

    /// Point a tag at an existing revision.
    pub fn tag(&self, uri: &str, tag: &str, revision: &str) {
        if let Some(repo) = self.repos.lock().get_mut(uri) {
            repo.refs.insert(tag.to_string(), revision.to_string());
        }
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of ref resolutions.
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    /// Number of clones.
    pub fn clones(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    /// Total remote calls.
    pub fn calls(&self) -> usize {
        self.resolves() + self.clones()
    }

    fn check_online(&self, uri: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::transport(uri, "could not resolve host"));
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

#[async_trait]
impl GitTransport for FakeGit {
    async fn resolve_ref(&self, uri: &str, reference: Option<&str>) -> Result<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.check_online(uri)?;
        let repos = self.repos.lock();
        let repo = repos
            .get(uri)
            .ok_or_else(|| Error::not_found(uri, format!("repository '{uri}' not found")))?;
        let revision = match reference {
            None => repo.head.clone(),
            Some(r) => repo
                .refs
                .get(r)
                .cloned()
                .or_else(|| repo.revisions.contains_key(r).then(|| r.to_string())),
        };
        revision.ok_or_else(|| {
            Error::not_found(
                uri,
                format!("no ref '{}' in '{uri}'", reference.unwrap_or("HEAD")),
            )
        })
    }

    async fn clone_repo(&self, uri: &str, dest: &Path) -> Result<()> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        self.check_online(uri)?;
        if !self.repos.lock().contains_key(uri) {
            return Err(Error::not_found(uri, format!("repository '{uri}' not found")));
        }
        let git_dir = dest.join(".git");
        fs::create_dir_all(&git_dir).map_err(|e| Error::io(&git_dir, e))?;
        let origin = dest.join(ORIGIN_FILE);
        fs::write(&origin, uri).map_err(|e| Error::io(&origin, e))?;
        Ok(())
    }

    async fn checkout(&self, repo: &Path, revision: &str) -> Result<()> {
        let uri = read(&repo.join(ORIGIN_FILE))?;
        let fixture = self
            .repos
            .lock()
            .get(&uri)
            .and_then(|r| r.revisions.get(revision))
            .cloned()
            .ok_or_else(|| Error::not_found(&uri, format!("no revision {revision}")))?;
        fixture
            .write_to(repo)
            .map_err(|e| Error::io(repo, e))?;
        let head = repo.join(HEAD_FILE);
        fs::write(&head, revision).map_err(|e| Error::io(&head, e))?;
        Ok(())
    }

    async fn rev_parse(&self, repo: &Path) -> Result<String> {
        read(&repo.join(HEAD_FILE))
    }
}
