//! Concurrent materialization of an assignment into the store.

use futures::stream::{self, StreamExt, TryStreamExt};
use larder_core::{CachedPackage, Constraint, Error, LocationSpec, Result, Version};
use larder_location::Locations;
use larder_resolver::ResolutionGraph;
use larder_store::PackageStore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Chosen version and origin per package name.
pub type Assignment = BTreeMap<String, (Version, LocationSpec)>;

/// Fetch everything reachable from `roots` through the assignment.
///
/// Packages are fetched in breadth-first waves, each wave bounded by
/// `concurrency` in-flight fetches. The result is in install order,
/// dependencies before dependents.
pub(crate) async fn materialize(
    locations: &Locations,
    store: &PackageStore,
    assignment: &Assignment,
    roots: impl IntoIterator<Item = String>,
    concurrency: usize,
) -> Result<Vec<CachedPackage>> {
    let mut seen = BTreeSet::new();
    let mut wave: Vec<String> = roots.into_iter().filter(|n| seen.insert(n.clone())).collect();
    let mut done = Vec::with_capacity(assignment.len());

    while !wave.is_empty() {
        debug!(packages = wave.len(), "materializing wave");
        let fetched: Vec<CachedPackage> = stream::iter(wave.iter())
            .map(|name| fetch_one(locations, store, assignment, name))
            .buffer_unordered(concurrency.max(1))
            .try_collect()
            .await?;

        let mut next = Vec::new();
        for package in fetched {
            for dependency in &package.dependencies {
                if dependency.name != package.name && seen.insert(dependency.name.clone()) {
                    next.push(dependency.name.clone());
                }
            }
            done.push(package);
        }
        next.sort();
        wave = next;
    }

    Ok(ResolutionGraph::from_packages(done).into_packages())
}

async fn fetch_one(
    locations: &Locations,
    store: &PackageStore,
    assignment: &Assignment,
    name: &str,
) -> Result<CachedPackage> {
    let (version, origin) = assignment.get(name).ok_or_else(|| {
        Error::not_found(name, "required but absent from the resolved set".to_string())
    })?;

    if let LocationSpec::Path { .. } = origin {
        let package = locations.fetch(origin, name, &Constraint::any(), store).await?;
        if package.version != *version {
            warn!(
                name,
                locked = %version,
                found = %package.version,
                "path package changed version since it was resolved"
            );
        }
        return Ok(package);
    }

    locations
        .fetch(origin, name, &Constraint::exact(version), store)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_test_utils::prelude::*;
    use pretty_assertions::assert_eq;

    const INDEX: &str = "https://index.example";

    fn assign(entries: &[(&str, &str)]) -> Assignment {
        entries
            .iter()
            .map(|(name, version)| {
                (
                    (*name).to_string(),
                    (Version::parse(version).unwrap(), LocationSpec::index(INDEX)),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn fetches_the_closure_of_the_roots_in_install_order() {
        let project = TempProject::new();
        project
            .index
            .publish(INDEX, PackageFixture::new("web", "1.0.0").depends_on("base", ">= 1.0"));
        project.index.publish(INDEX, PackageFixture::new("base", "1.2.0"));
        project.index.publish(INDEX, PackageFixture::new("extra", "3.0.0"));
        let store = PackageStore::open(&project.config()).unwrap();
        let assignment = assign(&[("web", "1.0.0"), ("base", "1.2.0"), ("extra", "3.0.0")]);

        let packages = materialize(
            &project.locations(),
            &store,
            &assignment,
            ["web".to_string()],
            4,
        )
        .await
        .unwrap();

        let names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["base", "web"]);
        assert_eq!(project.index.downloads(), 2);
    }

    #[tokio::test]
    async fn a_missing_dependency_is_an_error() {
        let project = TempProject::new();
        project
            .index
            .publish(INDEX, PackageFixture::new("web", "1.0.0").depends_on("base", ">= 1.0"));
        let store = PackageStore::open(&project.config()).unwrap();

        let err = materialize(
            &project.locations(),
            &store,
            &assign(&[("web", "1.0.0")]),
            ["web".to_string()],
            1,
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn path_packages_follow_the_disk() {
        let project = TempProject::new();
        let dir = project.local_package(&PackageFixture::new("app", "0.2.0"));
        let store = PackageStore::open(&project.config()).unwrap();
        let assignment = Assignment::from([(
            "app".to_string(),
            (Version::new(0, 1, 0), LocationSpec::path(&dir)),
        )]);

        let packages = materialize(&project.locations(), &store, &assignment, ["app".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(packages[0].version, Version::new(0, 2, 0));
    }
}
