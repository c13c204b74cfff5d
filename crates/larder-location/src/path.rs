//! Local directory locations.

use larder_core::{CachedPackage, Constraint, Error, LocationSpec, PackageDescriptor, Result};
use larder_store::validate_package;
use std::path::Path;
use tracing::debug;

/// Validate a package directory in place.
pub(crate) fn fetch(
    dir: &Path,
    name: &str,
    constraint: &Constraint,
    origin: &LocationSpec,
) -> Result<CachedPackage> {
    if !dir.is_dir() {
        return Err(Error::not_found(name, format!("{origin} does not exist")));
    }
    if !PackageDescriptor::present_in(dir) {
        return Err(Error::not_found(
            name,
            format!("{origin} has no package descriptor"),
        ));
    }

    let descriptor = validate_package(name, dir)?;
    if descriptor.name != name {
        return Err(Error::not_found(
            name,
            format!("{origin} contains package '{}'", descriptor.name),
        ));
    }
    if !constraint.satisfies(&descriptor.version) {
        return Err(Error::not_found(
            name,
            format!(
                "{origin} has version {}, which does not satisfy '{constraint}'",
                descriptor.version
            ),
        ));
    }

    debug!(name, path = %dir.display(), version = %descriptor.version, "using path package");
    CachedPackage::load(dir, origin.clone())
}
