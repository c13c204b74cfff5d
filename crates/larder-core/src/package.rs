//! Package descriptors and materialized packages.

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::location::LocationSpec;
use crate::requirement::Requirement;
use crate::version::{Constraint, Version};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File every package directory must contain.
pub const DESCRIPTOR_FILE: &str = "metadata.json";

/// Parsed `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageDescriptor {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
    /// Declared dependencies, name to constraint.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Constraint>,
}

impl PackageDescriptor {
    /// Read the descriptor from a package directory.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::descriptor(&path, "descriptor file is missing"));
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        let descriptor: Self =
            sonic_rs::from_str(&raw).map_err(|e| Error::descriptor(&path, e.to_string()))?;
        if descriptor.name.trim().is_empty() {
            return Err(Error::descriptor(&path, "package name is empty"));
        }
        Ok(descriptor)
    }

    /// Whether a directory carries a descriptor at all.
    #[must_use]
    pub fn present_in(dir: &Path) -> bool {
        dir.join(DESCRIPTOR_FILE).is_file()
    }

    /// Declared dependencies as requirements, in name order.
    #[must_use]
    pub fn requirements(&self) -> Vec<Requirement> {
        self.dependencies
            .iter()
            .map(|(name, constraint)| Requirement::new(name.clone(), constraint.clone()))
            .collect()
    }
}

/// A package materialized on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPackage {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
    /// Where the package came from.
    pub origin: LocationSpec,
    /// Checksum of the package contents.
    pub checksum: Digest,
    /// Declared dependencies.
    pub dependencies: Vec<Requirement>,
    /// Directory holding the contents.
    pub path: PathBuf,
}

impl CachedPackage {
    /// Load a package from a directory, computing its checksum.
    pub fn load(path: &Path, origin: LocationSpec) -> Result<Self> {
        let descriptor = PackageDescriptor::read(path)?;
        let checksum = Digest::of_dir(path)?;
        Ok(Self {
            dependencies: descriptor.requirements(),
            name: descriptor.name,
            version: descriptor.version,
            origin,
            checksum,
            path: path.to_path_buf(),
        })
    }
}
