//! The output of resolution: one package per name plus the edges between them.

use ahash::AHashMap;
use larder_core::{CachedPackage, LocationSpec, Version};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};

/// A package chosen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// Package name.
    pub name: String,
    /// Chosen version.
    pub version: Version,
    /// Location the package was materialized from.
    pub origin: LocationSpec,
    /// The materialized package.
    pub package: CachedPackage,
    /// Names of resolved packages this one depends on, sorted.
    pub dependencies: Vec<String>,
}

/// Version assignment for every reachable name.
///
/// Edges point from a dependency to its dependents, so a topological walk
/// visits dependencies first.
#[derive(Debug, Clone, Default)]
pub struct ResolutionGraph {
    packages: BTreeMap<String, ResolvedPackage>,
    graph: DiGraph<String, ()>,
    indices: AHashMap<String, NodeIndex>,
}

impl ResolutionGraph {
    /// Build a graph over materialized packages.
    ///
    /// Declared dependencies on names outside the set are not edges.
    pub fn from_packages(packages: impl IntoIterator<Item = CachedPackage>) -> Self {
        let packages: BTreeMap<String, CachedPackage> = packages
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        let mut graph = DiGraph::new();
        let mut indices = AHashMap::with_capacity(packages.len());
        for name in packages.keys() {
            indices.insert(name.clone(), graph.add_node(name.clone()));
        }

        let mut resolved = BTreeMap::new();
        for (name, package) in packages {
            let dependencies: Vec<String> = package
                .dependencies
                .iter()
                .map(|d| d.name.clone())
                .filter(|d| *d != name && indices.contains_key(d))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let from = indices[&name];
            for dependency in &dependencies {
                graph.add_edge(indices[dependency], from, ());
            }
            resolved.insert(
                name.clone(),
                ResolvedPackage {
                    name,
                    version: package.version.clone(),
                    origin: package.origin.clone(),
                    package,
                    dependencies,
                },
            );
        }

        Self {
            packages: resolved,
            graph,
            indices,
        }
    }

    /// Number of resolved packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// A resolved package by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages.get(name)
    }

    /// Whether `name` was resolved.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Resolved packages in name order.
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.values()
    }

    /// Chosen version per name.
    #[must_use]
    pub fn assignment(&self) -> BTreeMap<&str, &Version> {
        self.packages
            .iter()
            .map(|(name, p)| (name.as_str(), &p.version))
            .collect()
    }

    /// Packages that depend directly on `name`, in name order.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<&ResolvedPackage> {
        let Some(&idx) = self.indices.get(name) else {
            return vec![];
        };
        let mut dependents: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.get(&self.graph[n]))
            .collect();
        dependents.sort_by(|a, b| a.name.cmp(&b.name));
        dependents.dedup_by(|a, b| a.name == b.name);
        dependents
    }

    /// Packages ordered so that dependencies precede their dependents.
    ///
    /// Ties are broken by name. A dependency cycle is broken at its
    /// lexicographically smallest member.
    #[must_use]
    pub fn install_order(&self) -> Vec<&ResolvedPackage> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .packages
            .iter()
            .map(|(name, p)| (name.as_str(), p.dependencies.len()))
            .collect();
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();

        let mut order = Vec::with_capacity(self.packages.len());
        while !in_degree.is_empty() {
            let next = match ready.pop_first() {
                Some(name) => name,
                None => match in_degree.keys().next() {
                    Some(name) => *name,
                    None => break,
                },
            };
            if in_degree.remove(next).is_none() {
                continue;
            }
            order.push(&self.packages[next]);

            for dependent in self
                .graph
                .neighbors_directed(self.indices[next], Direction::Outgoing)
            {
                let dependent = self.graph[dependent].as_str();
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
        order
    }

    /// Materialized packages in install order.
    #[must_use]
    pub fn into_packages(self) -> Vec<CachedPackage> {
        let order: Vec<String> = self
            .install_order()
            .into_iter()
            .map(|p| p.name.clone())
            .collect();
        let mut packages = self.packages;
        order
            .iter()
            .filter_map(|name| packages.remove(name))
            .map(|p| p.package)
            .collect()
    }
}
