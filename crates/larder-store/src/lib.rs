//! Content-addressed package store.
//!
//! Packages live at `<root>/packages/<name>-<id>`, where the id is a version
//! or a git revision. A destination, once populated, is never modified:
//! insertion writes into a private scratch directory on the same
//! filesystem, validates it, then renames it into place while holding an
//! exclusive per-destination lock. Readers therefore see either nothing or
//! a complete package.
//!
//! ```no_run
//! # async fn demo() -> larder_core::Result<()> {
//! use larder_config::LarderConfig;
//! use larder_core::{LocationSpec, Version};
//! use larder_store::{PackageStore, StoreKey};
//!
//! let store = PackageStore::open(&LarderConfig::at_root("/tmp/larder"))?;
//! let key = StoreKey::version("nginx", &Version::new(1, 0, 0))?;
//! let origin = LocationSpec::index("https://index.example");
//! let cached = store.get(&key, &origin)?;
//! # Ok(())
//! # }
//! ```

mod lock;
mod validate;

pub use lock::DestinationLock;
pub use validate::{invalid_file_names, validate_package};

use larder_config::LarderConfig;
use larder_core::{CachedPackage, Error, LocationSpec, Result, Version};
use std::fmt;
use std::fs::{self, File};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::{debug, info, trace, warn};

/// Prefix of scratch directories under `tmp/`.
const SCRATCH_PREFIX: &str = ".scratch-";

/// Identity of a stored package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    name: String,
    id: String,
}

impl StoreKey {
    /// Key from a package name and an id (version or revision).
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let id = id.into();
        for part in [&name, &id] {
            if part.is_empty()
                || part.starts_with('.')
                || part.contains(['/', '\\'])
                || part.contains("..")
            {
                return Err(Error::Validation {
                    name: name.clone(),
                    path: PathBuf::from(format!("{name}-{id}")),
                    message: format!("'{part}' cannot be used as a store path component"),
                });
            }
        }
        Ok(Self { name, id })
    }

    /// Key for a versioned package.
    pub fn version(name: impl Into<String>, version: &Version) -> Result<Self> {
        Self::new(name, version.to_string())
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version or revision.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory name under `packages/`.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.name, self.id)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.id)
    }
}

/// On-disk package store.
#[derive(Debug, Clone)]
pub struct PackageStore {
    packages: PathBuf,
    tmp: PathBuf,
    locks: PathBuf,
    lock_timeout: Duration,
}

impl PackageStore {
    /// Open the store described by a configuration, creating its layout.
    pub fn open(config: &LarderConfig) -> Result<Self> {
        let store = Self {
            packages: config.packages_dir(),
            tmp: config.tmp_dir(),
            locks: config.locks_dir(),
            lock_timeout: config.lock_timeout,
        };
        store.ensure_layout()?;
        debug!(root = %config.root.display(), "opened package store");
        Ok(store)
    }

    /// Open a store rooted at `root` with default settings.
    pub fn at_path(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open(&LarderConfig::at_root(root))
    }

    fn ensure_layout(&self) -> Result<()> {
        for dir in [&self.packages, &self.tmp, &self.locks] {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        Ok(())
    }

    /// Directory a key maps to, populated or not.
    #[must_use]
    pub fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.packages.join(key.dir_name())
    }

    fn lock_path(&self, key: &StoreKey) -> PathBuf {
        self.locks.join(format!("{}.lock", key.dir_name()))
    }

    /// Whether a key is populated.
    #[must_use]
    pub fn contains(&self, key: &StoreKey) -> bool {
        self.path_for(key).is_dir()
    }

    /// Load a stored package without contacting any location.
    pub fn get(&self, key: &StoreKey, origin: &LocationSpec) -> Result<Option<CachedPackage>> {
        let path = self.path_for(key);
        if !path.is_dir() {
            return Ok(None);
        }
        trace!(key = %key, "store hit");
        CachedPackage::load(&path, origin.clone()).map(Some)
    }

    /// A private scratch directory on the store's filesystem, removed on drop.
    pub fn scratch(&self) -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.tmp)
            .map_err(|e| Error::io(&self.tmp, e))
    }

    /// Insert a package, populating it through `populate` only if absent.
    ///
    /// `populate` receives an empty scratch directory and returns the
    /// package root it wrote inside it. On any failure the scratch is
    /// discarded and the destination stays absent.
    pub async fn insert_with<F, Fut>(
        &self,
        key: &StoreKey,
        origin: LocationSpec,
        populate: F,
    ) -> Result<CachedPackage>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<PathBuf>>,
    {
        if let Some(existing) = self.get(key, &origin)? {
            return Ok(existing);
        }

        let _lock = DestinationLock::acquire_async(self.lock_path(key), self.lock_timeout).await?;

        if let Some(existing) = self.get(key, &origin)? {
            debug!(key = %key, "destination populated by a concurrent writer");
            return Ok(existing);
        }

        let scratch = self.scratch()?;
        let root = populate(scratch.path().to_path_buf()).await?;
        if !root.starts_with(scratch.path()) {
            return Err(Error::Io {
                path: root,
                message: "package root must lie inside the scratch directory".to_string(),
            });
        }

        validate_package(key.name(), &root)?;

        let dest = self.path_for(key);
        fs::rename(&root, &dest).map_err(|e| Error::io(&dest, e))?;
        sync_dir(&self.packages);

        info!(key = %key, "stored package");
        CachedPackage::load(&dest, origin)
    }

    /// Keys of every stored package, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.packages).map_err(|e| Error::io(&self.packages, e))? {
            let entry = entry.map_err(|e| Error::io(&self.packages, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove every stored package. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.list()? {
            let path = self.packages.join(&name);
            fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            removed += 1;
        }
        info!(removed, "cleared package store");
        Ok(removed)
    }

    /// Remove scratch directories abandoned by crashed runs.
    pub fn recover(&self, older_than: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for entry in fs::read_dir(&self.tmp).map_err(|e| Error::io(&self.tmp, e))? {
            let entry = entry.map_err(|e| Error::io(&self.tmp, e))?;
            if !entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if modified <= cutoff {
                let path = entry.path();
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove scratch");
                    continue;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Flush a directory entry change (for POSIX crash safety).
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::DESCRIPTOR_FILE;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn origin() -> LocationSpec {
        LocationSpec::index("https://index.example")
    }

    async fn write_package(dir: PathBuf, name: &str, version: &str) -> Result<PathBuf> {
        tokio::fs::write(
            dir.join(DESCRIPTOR_FILE),
            format!(r#"{{"name":"{name}","version":"{version}"}}"#),
        )
        .await
        .map_err(|e| Error::io(&dir, e))?;
        Ok(dir)
    }

    fn scratch_entries(root: &Path) -> usize {
        fs::read_dir(root.join("tmp")).unwrap().count()
    }

    #[test]
    fn key_rejects_path_components() {
        assert!(StoreKey::new("nginx", "1.0.0").is_ok());
        assert!(StoreKey::new("../etc", "1.0.0").is_err());
        assert!(StoreKey::new("nginx", "a/b").is_err());
        assert!(StoreKey::new("", "1").is_err());
        assert_eq!(
            StoreKey::version("nginx", &Version::new(1, 2, 0))
                .unwrap()
                .dir_name(),
            "nginx-1.2.0"
        );
    }

    #[tokio::test]
    async fn insert_then_get() {
        let root = TempDir::new().unwrap();
        let store = PackageStore::at_path(root.path()).unwrap();
        let key = StoreKey::new("nginx", "1.0.0").unwrap();

        assert!(store.get(&key, &origin()).unwrap().is_none());
        let inserted = store
            .insert_with(&key, origin(), |dir| write_package(dir, "nginx", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(inserted.path, root.path().join("packages/nginx-1.0.0"));
        assert!(store.contains(&key));

        let fetched = store.get(&key, &origin()).unwrap().unwrap();
        assert_eq!(fetched.checksum, inserted.checksum);
        assert_eq!(store.list().unwrap(), vec!["nginx-1.0.0".to_string()]);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn existing_destination_skips_populate() {
        let root = TempDir::new().unwrap();
        let store = PackageStore::at_path(root.path()).unwrap();
        let key = StoreKey::new("nginx", "1.0.0").unwrap();
        store
            .insert_with(&key, origin(), |dir| write_package(dir, "nginx", "1.0.0"))
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        store
            .insert_with(&key, origin(), |dir| {
                calls.fetch_add(1, Ordering::SeqCst);
                write_package(dir, "nginx", "1.0.0")
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_inserts_populate_once() {
        let root = TempDir::new().unwrap();
        let store = Arc::new(PackageStore::at_path(root.path()).unwrap());
        let key = StoreKey::new("nginx", "1.0.0").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let key = key.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                store
                    .insert_with(&key, origin(), |dir| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            write_package(dir, "nginx", "1.0.0").await
                        }
                    })
                    .await
            }));
        }

        let mut checksums = Vec::new();
        for handle in handles {
            checksums.push(handle.await.unwrap().unwrap().checksum);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(checksums.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn failed_populate_leaves_nothing() {
        let root = TempDir::new().unwrap();
        let store = PackageStore::at_path(root.path()).unwrap();
        let key = StoreKey::new("nginx", "1.0.0").unwrap();

        let err = store
            .insert_with(&key, origin(), |dir| async move {
                tokio::fs::write(dir.join("partial.rb"), "")
                    .await
                    .map_err(|e| Error::io(&dir, e))?;
                Err::<PathBuf, _>(Error::transport("index", "connection reset"))
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!store.contains(&key));
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn invalid_contents_are_rejected() {
        let root = TempDir::new().unwrap();
        let store = PackageStore::at_path(root.path()).unwrap();
        let key = StoreKey::new("nginx", "1.0.0").unwrap();

        let err = store
            .insert_with(&key, origin(), |dir| async move {
                let dir = write_package(dir, "nginx", "1.0.0").await?;
                tokio::fs::write(dir.join("bad name.rb"), "")
                    .await
                    .map_err(|e| Error::io(&dir, e))?;
                Ok(dir)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(!store.contains(&key));
    }

    #[tokio::test]
    async fn clear_and_recover() {
        let root = TempDir::new().unwrap();
        let store = PackageStore::at_path(root.path()).unwrap();
        for version in ["1.0.0", "1.1.0"] {
            let key = StoreKey::new("nginx", version).unwrap();
            store
                .insert_with(&key, origin(), |dir| write_package(dir, "nginx", version))
                .await
                .unwrap();
        }

        let abandoned = store.scratch().unwrap().keep();
        assert!(abandoned.exists());
        assert_eq!(store.recover(Duration::ZERO).unwrap(), 1);
        assert!(!abandoned.exists());

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.list().unwrap().is_empty());
    }
}
