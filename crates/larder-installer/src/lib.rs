//! Installation for Larder.
//!
//! [`Installer::install`] runs the whole pipeline for one manifest:
//!
//! 1. reconcile the manifest with its lockfile ([`Reconciler`])
//! 2. resolve whatever the lockfile cannot answer ([`StoreProvider`])
//! 3. materialize every selected package into the store, concurrently
//! 4. optionally vendor the packages into a project directory
//! 5. write the new lockfile, only once everything above succeeded
//!
//! A clean lockfile with a warm store performs no network access at all.

mod ignore;
mod materialize;
mod provider;
mod reconcile;
mod vendor;

pub use ignore::{IGNORE_FILE, IgnoreRules};
pub use materialize::Assignment;
pub use provider::StoreProvider;
pub use reconcile::{LockState, ReconcilePlan, Reconciler, UpdateScope, attach_credentials};

use larder_config::LarderConfig;
use larder_core::{CachedPackage, Error, GroupFilter, LocationSpec, Manifest, Result};
use larder_location::Locations;
use larder_lockfile::{Lockfile, LockfileManager};
use larder_resolver::{ResolutionGraph, Resolver, ResolverConfig};
use larder_store::PackageStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Age after which an abandoned scratch directory is reclaimed.
const SCRATCH_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// What an install run should do.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Groups to materialize. Resolution always covers every group.
    pub groups: GroupFilter,
    /// Packages released from their locks.
    pub update: UpdateScope,
    /// Directory to vendor the installed packages into, honoring the
    /// project's `chefignore`.
    pub vendor: Option<PathBuf>,
}

/// Outcome of an install run.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Lock state the run started in.
    pub state: LockState,
    /// Installed packages, dependencies first.
    pub packages: Vec<CachedPackage>,
    /// Lockfile now on disk.
    pub lockfile: Lockfile,
    /// Top-level packages kept at their locked version.
    pub reused: Vec<String>,
}

impl InstallReport {
    /// Installed package by name.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<&CachedPackage> {
        self.packages.iter().find(|p| p.name == name)
    }
}

/// Installs manifests into a store.
#[derive(Debug, Clone)]
pub struct Installer {
    config: LarderConfig,
    store: PackageStore,
    locations: Locations,
    lockfile: LockfileManager,
}

impl Installer {
    /// Installer over explicit locations, writing the lockfile at `lockfile`.
    pub fn new(
        config: LarderConfig,
        locations: Locations,
        lockfile: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let store = PackageStore::open(&config)?;
        let lockfile = LockfileManager::new(lockfile).with_lock_timeout(config.lock_timeout);
        Ok(Self {
            config,
            store,
            locations,
            lockfile,
        })
    }

    /// Installer over the real git and HTTP transports.
    pub fn from_config(config: LarderConfig, lockfile: impl Into<PathBuf>) -> Result<Self> {
        let locations = Locations::from_config(&config)?;
        Self::new(config, locations, lockfile)
    }

    /// The package store.
    #[must_use]
    pub const fn store(&self) -> &PackageStore {
        &self.store
    }

    /// The lockfile path.
    #[must_use]
    pub fn lockfile_path(&self) -> &Path {
        self.lockfile.path()
    }

    /// Install `manifest`.
    ///
    /// The lockfile on disk is replaced only after every package has been
    /// materialized (and vendored, when asked); a failed run leaves it as
    /// it was.
    pub async fn install(&self, manifest: &Manifest, options: &InstallOptions) -> Result<InstallReport> {
        let started = Instant::now();
        let roots: Vec<String> = manifest
            .filtered(&options.groups)?
            .into_iter()
            .map(|r| r.name)
            .collect();

        if self.lockfile.recover()? {
            debug!(path = %self.lockfile.path().display(), "recovered interrupted lockfile write");
        }
        self.store.recover(SCRATCH_MAX_AGE)?;

        let existing = self.lockfile.read()?;
        let plan = Reconciler::new(manifest).reconcile(existing.as_ref(), &options.update)?;

        let (assignment, resolved) = if plan.state == LockState::LockedClean {
            let assignment: Assignment = plan
                .locked
                .iter()
                .map(|e| (e.name.clone(), (e.locked_version.clone(), e.origin.clone())))
                .collect();
            (assignment, None)
        } else {
            let graph = self.resolve(manifest, &plan).await?;
            let assignment: Assignment = graph
                .packages()
                .map(|p| (p.name.clone(), (p.version.clone(), p.origin.clone())))
                .collect();
            let lockfile =
                Lockfile::from_packages(*manifest.digest(), graph.packages().map(|p| &p.package))?;
            (assignment, Some(lockfile))
        };

        let packages = materialize::materialize(
            &self.locations,
            &self.store,
            &assignment,
            roots,
            self.config.max_concurrent_fetches,
        )
        .await?;

        if let Some(dest) = &options.vendor {
            let project = self
                .lockfile
                .path()
                .parent()
                .unwrap_or_else(|| Path::new("."));
            let ignore = IgnoreRules::discover(project)?;
            vendor::vendor(&packages, dest, &ignore).await?;
        }

        let lockfile = match (resolved, existing) {
            (Some(lockfile), _) => {
                self.lockfile.write(&lockfile)?;
                lockfile
            }
            (None, Some(existing)) => existing,
            (None, None) => {
                return Err(Error::Lockfile {
                    path: self.lockfile.path().to_path_buf(),
                    message: "lockfile disappeared during the run".to_string(),
                });
            }
        };

        info!(
            state = %plan.state,
            packages = packages.len(),
            reused = plan.reused.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "install complete"
        );
        Ok(InstallReport {
            state: plan.state,
            packages,
            lockfile,
            reused: plan.reused,
        })
    }

    async fn resolve(&self, manifest: &Manifest, plan: &ReconcilePlan) -> Result<ResolutionGraph> {
        let defaults: Vec<LocationSpec> = if manifest.default_locations().is_empty() {
            self.config.default_locations.clone()
        } else {
            manifest.default_locations().to_vec()
        };
        let provider = Arc::new(StoreProvider::new(
            self.locations.clone(),
            self.store.clone(),
            defaults,
        ));
        let resolver = Resolver::new(
            provider,
            ResolverConfig {
                max_backtracks: self.config.max_backtracks,
            },
        )
        .with_preferred(plan.preferred.clone());
        resolver.resolve(&plan.requirements).await
    }
}
