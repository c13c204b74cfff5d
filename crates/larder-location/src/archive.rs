//! Index and API locations: versioned archives over HTTP.

use crate::Locations;
use crate::extract::{extract_tar_gz, package_root};
use larder_core::{CachedPackage, Constraint, Error, LocationSpec, PackageDescriptor, Result, Version};
use larder_store::{PackageStore, StoreKey};
use tracing::{debug, info};

/// Versions offered for `name`, highest first, without duplicates.
pub(crate) async fn available_versions(
    locations: &Locations,
    spec: &LocationSpec,
    name: &str,
) -> Result<Vec<Version>> {
    let mut versions = locations
        .deadline(spec, locations.archive().versions(spec, name))
        .await
        .map_err(|e| crate::not_found_for(name, e))?;
    versions.sort_unstable_by(|a, b| b.cmp(a));
    versions.dedup();
    debug!(name, location = %spec, count = versions.len(), "listed versions");
    Ok(versions)
}

/// Fetch the highest version satisfying `constraint`.
pub(crate) async fn fetch(
    locations: &Locations,
    spec: &LocationSpec,
    name: &str,
    constraint: &Constraint,
    store: &PackageStore,
) -> Result<CachedPackage> {
    if let Some(version) = constraint.as_exact() {
        let key = StoreKey::version(name, version)?;
        if let Some(cached) = store.get(&key, spec)? {
            return Ok(cached);
        }
    }

    let versions = available_versions(locations, spec, name).await?;
    let Some(version) = versions.iter().find(|v| constraint.satisfies(v)).cloned() else {
        let offered = versions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::not_found(
            name,
            format!("{spec} has no version satisfying '{constraint}' (offers: {offered})"),
        ));
    };

    let key = StoreKey::version(name, &version)?;
    store
        .insert_with(&key, spec.clone(), |scratch| async move {
            let archive = locations
                .deadline(
                    spec,
                    locations.archive().download(spec, name, &version, &scratch),
                )
                .await
                .map_err(|e| crate::not_found_for(name, e))?;

            let unpacked = scratch.join("unpacked");
            extract_tar_gz(&archive, &unpacked).await.map_err(|e| {
                Error::not_found(name, format!("{spec}: could not extract {name} {version}: {e}"))
            })?;

            let root = package_root(&unpacked).await.ok_or_else(|| {
                Error::not_found(
                    name,
                    format!("{spec}: archive for {name} {version} has no package descriptor"),
                )
            })?;

            let descriptor = PackageDescriptor::read(&root)?;
            if descriptor.name != name || descriptor.version != version {
                return Err(Error::not_found(
                    name,
                    format!(
                        "{spec}: archive for {name} {version} contains {} {}",
                        descriptor.name, descriptor.version
                    ),
                ));
            }

            info!(name, version = %version, location = %spec, "downloaded package");
            Ok(root)
        })
        .await
}
