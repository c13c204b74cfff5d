//! Dependency resolution for Larder.
//!
//! [`Resolver`] assigns exactly one version to every package name reachable
//! from a set of top-level requirements. Candidates and package metadata
//! come from a [`DependencyProvider`], so the search itself never touches
//! the network or the store directly.
//!
//! # Rules
//!
//! - Every constraint on a name, direct or transitive, must hold for the
//!   chosen version; each one remembers who imposed it.
//! - The highest viable version wins. Equal versions offered by several
//!   locations resolve to the location registered first.
//! - A top-level requirement pinned to a path or git location always wins
//!   over transitive constraints on the same name.
//! - Conflicts backtrack chronologically; when no choice point is left the
//!   search fails with `NoSolution` and the full constraint trace.
//!
//! # Example
//!
//! ```rust,ignore
//! use larder_resolver::{Resolver, ResolverConfig};
//!
//! let resolver = Resolver::new(Arc::new(provider), ResolverConfig::default());
//! let graph = resolver.resolve(manifest.requirements()).await?;
//! for package in graph.install_order() {
//!     println!("{} {}", package.name, package.version);
//! }
//! ```

mod graph;
mod provider;
mod resolver;

pub use graph::{ResolutionGraph, ResolvedPackage};
pub use provider::{Candidate, DependencyProvider};
pub use resolver::{DEFAULT_MAX_BACKTRACKS, Resolver, ResolverConfig};

#[cfg(test)]
pub(crate) mod testing {
    use crate::{Candidate, DependencyProvider};
    use async_trait::async_trait;
    use larder_core::{
        CachedPackage, Constraint, Digest, Error, LocationSpec, Requirement, Result, Version,
    };
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct Entry {
        name: String,
        version: Version,
        origin: LocationSpec,
        dependencies: Vec<Requirement>,
    }

    /// In-memory provider keyed by name and version.
    #[derive(Debug, Default)]
    pub struct MemoryProvider {
        entries: Vec<Entry>,
        pub fetches: AtomicUsize,
    }

    impl MemoryProvider {
        pub fn package(self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
            self.package_at(name, version, deps, LocationSpec::index("https://index.example"))
        }

        pub fn package_at(
            mut self,
            name: &str,
            version: &str,
            deps: &[(&str, &str)],
            origin: LocationSpec,
        ) -> Self {
            self.entries.push(Entry {
                name: name.to_string(),
                version: Version::parse(version).unwrap(),
                origin,
                dependencies: deps
                    .iter()
                    .map(|(n, c)| Requirement::new(*n, Constraint::parse(c).unwrap()))
                    .collect(),
            });
            self
        }
    }

    #[async_trait]
    impl DependencyProvider for MemoryProvider {
        async fn candidates(&self, requirement: &Requirement) -> Result<Vec<Candidate>> {
            let mut candidates: Vec<Candidate> = self
                .entries
                .iter()
                .filter(|e| e.name == requirement.name)
                .map(|e| Candidate::new(e.version.clone(), e.origin.clone()))
                .collect();
            if candidates.is_empty() {
                return Err(Error::not_found(&requirement.name, "no such package"));
            }
            candidates.sort_by(|a, b| b.version.cmp(&a.version));
            Ok(candidates)
        }

        async fn fetch_metadata(
            &self,
            requirement: &Requirement,
            candidate: &Candidate,
        ) -> Result<CachedPackage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let entry = self
                .entries
                .iter()
                .find(|e| {
                    e.name == requirement.name
                        && e.version == candidate.version
                        && e.origin == candidate.origin
                })
                .ok_or_else(|| Error::not_found(&requirement.name, "no such version"))?;
            Ok(CachedPackage {
                name: entry.name.clone(),
                version: entry.version.clone(),
                origin: entry.origin.clone(),
                checksum: Digest::of_bytes(entry.name.as_bytes()),
                dependencies: entry.dependencies.clone(),
                path: PathBuf::from(format!("/store/{}-{}", entry.name, entry.version)),
            })
        }
    }
}
