//! Dependency provider backed by locations and the package store.

use ahash::AHashMap;
use async_trait::async_trait;
use larder_core::{
    CachedPackage, Constraint, Error, LocationSpec, Requirement, Result, Version,
};
use larder_location::Locations;
use larder_resolver::{Candidate, DependencyProvider};
use larder_store::{PackageStore, StoreKey};
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, trace};

type MemoKey = (LocationSpec, String);

/// Answers the resolver from real locations, materializing into the store.
///
/// Default locations are tried in order. The first one offering a version
/// that satisfies the requirement supplies every candidate. Later ones are
/// consulted only when earlier ones lack the package or a matching version.
///
/// Version listings and pinned fetches are memoized for the lifetime of
/// the provider, so one resolution contacts each location at most once
/// per name no matter how often the search revisits it.
pub struct StoreProvider {
    locations: Locations,
    store: PackageStore,
    default_locations: Vec<LocationSpec>,
    versions: Mutex<AHashMap<MemoKey, Vec<Version>>>,
    fetched: Mutex<AHashMap<MemoKey, CachedPackage>>,
}

impl fmt::Debug for StoreProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreProvider")
            .field("store", &self.store)
            .field("default_locations", &self.default_locations)
            .field("listed", &self.versions.lock().len())
            .field("fetched", &self.fetched.lock().len())
            .finish()
    }
}

impl StoreProvider {
    /// Provider consulting `default_locations`, in order, for requirements
    /// that name no location of their own.
    #[must_use]
    pub fn new(
        locations: Locations,
        store: PackageStore,
        default_locations: Vec<LocationSpec>,
    ) -> Self {
        Self {
            locations,
            store,
            default_locations,
            versions: Mutex::new(AHashMap::new()),
            fetched: Mutex::new(AHashMap::new()),
        }
    }

    fn chain<'a>(&'a self, requirement: &'a Requirement) -> &'a [LocationSpec] {
        requirement
            .location
            .as_ref()
            .map_or(self.default_locations.as_slice(), std::slice::from_ref)
    }

    /// Candidates offered by a single location.
    async fn offered(
        &self,
        location: &LocationSpec,
        requirement: &Requirement,
    ) -> Result<Vec<Candidate>> {
        let name = &requirement.name;
        if location.is_pin() {
            let package = self.fetch_pinned(location, name).await?;
            return Ok(vec![Candidate::new(package.version, package.origin)]);
        }

        if let Some(version) = requirement.constraint.as_exact() {
            if self.store.contains(&StoreKey::version(name, version)?) {
                trace!(name = %name, version = %version, "exact version already stored");
                return Ok(vec![Candidate::new(version.clone(), location.clone())]);
            }
        }

        let versions = self.list(location, name).await?;
        Ok(versions
            .into_iter()
            .map(|v| Candidate::new(v, location.clone()))
            .collect())
    }

    async fn list(&self, location: &LocationSpec, name: &str) -> Result<Vec<Version>> {
        let key = (location.clone(), name.to_string());
        if let Some(versions) = self.versions.lock().get(&key) {
            return Ok(versions.clone());
        }
        let versions = self.locations.available_versions(location, name).await?;
        self.versions.lock().insert(key, versions.clone());
        Ok(versions)
    }

    /// Path and git locations offer exactly what they contain.
    ///
    /// The version is checked by the resolver, not here, so a mismatch
    /// shows up in the conflict trace.
    async fn fetch_pinned(&self, location: &LocationSpec, name: &str) -> Result<CachedPackage> {
        let key = (location.clone(), name.to_string());
        if let Some(package) = self.fetched.lock().get(&key) {
            return Ok(package.clone());
        }
        let package = self
            .locations
            .fetch(location, name, &Constraint::any(), &self.store)
            .await?;
        let mut fetched = self.fetched.lock();
        fetched.insert((package.origin.clone(), name.to_string()), package.clone());
        fetched.insert(key, package.clone());
        Ok(package)
    }
}

#[async_trait]
impl DependencyProvider for StoreProvider {
    async fn candidates(&self, requirement: &Requirement) -> Result<Vec<Candidate>> {
        let chain = self.chain(requirement);
        if chain.is_empty() {
            return Err(Error::not_found(
                &requirement.name,
                "no location is configured for it",
            ));
        }

        let mut diagnostics = Vec::new();
        let mut unviable: Option<Vec<Candidate>> = None;
        for location in chain {
            let mut offered = match self.offered(location, requirement).await {
                Ok(offered) => offered,
                Err(Error::NotFound {
                    diagnostics: found, ..
                }) => {
                    diagnostics.extend(found);
                    continue;
                }
                Err(e) => return Err(e),
            };
            offered.sort_by(|a, b| b.version.cmp(&a.version));
            if !location.is_pin()
                && !offered
                    .iter()
                    .any(|c| requirement.constraint.satisfies(&c.version))
            {
                trace!(name = %requirement.name, location = %location, "no matching version");
                unviable.get_or_insert(offered);
                continue;
            }
            debug!(
                name = %requirement.name,
                location = %location,
                candidates = offered.len(),
                "collected candidates"
            );
            return Ok(offered);
        }

        // Let the resolver report the version conflict with its trace.
        if let Some(offered) = unviable {
            return Ok(offered);
        }
        Err(Error::NotFound {
            name: requirement.name.clone(),
            diagnostics,
        })
    }

    async fn fetch_metadata(
        &self,
        requirement: &Requirement,
        candidate: &Candidate,
    ) -> Result<CachedPackage> {
        let key = (candidate.origin.clone(), requirement.name.clone());
        if let Some(package) = self.fetched.lock().get(&key) {
            if package.version == candidate.version {
                return Ok(package.clone());
            }
        }

        let constraint = if candidate.origin.is_pin() {
            Constraint::any()
        } else {
            Constraint::exact(&candidate.version)
        };
        let package = self
            .locations
            .fetch(&candidate.origin, &requirement.name, &constraint, &self.store)
            .await?;
        self.fetched.lock().insert(key, package.clone());
        Ok(package)
    }
}
