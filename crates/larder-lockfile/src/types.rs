//! Lockfile data model and its on-disk JSON form.

use crate::error::{LockfileError, Result};
use larder_core::{CachedPackage, Digest, LocationSpec, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One locked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Package name.
    pub name: String,
    /// Version chosen by the last successful resolution.
    pub locked_version: Version,
    /// Where the package was materialized from. Git origins carry the
    /// resolved revision; API origins never carry credentials.
    pub origin: LocationSpec,
}

impl LockEntry {
    /// Create an entry, dropping any credentials from the origin.
    #[must_use]
    pub fn new(name: impl Into<String>, locked_version: Version, origin: &LocationSpec) -> Self {
        Self {
            name: name.into(),
            locked_version,
            origin: origin.without_credentials(),
        }
    }

    /// Entry recording a materialized package.
    #[must_use]
    pub fn from_package(package: &CachedPackage) -> Self {
        Self::new(&package.name, package.version.clone(), &package.origin)
    }
}

/// Serialized shape; field order is the on-disk order.
#[derive(Serialize, Deserialize)]
struct Document {
    manifest_digest: Digest,
    entries: Vec<LockEntry>,
}

/// Record of the last successful resolution, keyed to the manifest digest.
///
/// Entries are unique by name and always sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lockfile {
    manifest_digest: Digest,
    entries: Vec<LockEntry>,
}

impl Lockfile {
    /// Build a lockfile, sorting the entries by name.
    pub fn new(manifest_digest: Digest, mut entries: Vec<LockEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(LockfileError::DuplicatePackage {
                name: pair[0].name.clone(),
            });
        }
        Ok(Self {
            manifest_digest,
            entries,
        })
    }

    /// Lockfile recording a set of materialized packages.
    pub fn from_packages<'a>(
        manifest_digest: Digest,
        packages: impl IntoIterator<Item = &'a CachedPackage>,
    ) -> Result<Self> {
        Self::new(
            manifest_digest,
            packages.into_iter().map(LockEntry::from_package).collect(),
        )
    }

    /// Digest of the manifest this lockfile was written for.
    #[must_use]
    pub const fn manifest_digest(&self) -> &Digest {
        &self.manifest_digest
    }

    /// Whether the lockfile was written for a manifest with this digest.
    #[must_use]
    pub fn matches(&self, digest: &Digest) -> bool {
        &self.manifest_digest == digest
    }

    /// Entries in name order.
    #[must_use]
    pub fn entries(&self) -> &[LockEntry] {
        &self.entries
    }

    /// Entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Locked package names.
    #[must_use]
    pub fn names(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the on-disk form.
    pub fn parse(content: &str) -> Result<Self> {
        let document: Document = sonic_rs::from_str(content)?;
        if let Some(entry) = document.entries.iter().find(|e| e.name.trim().is_empty()) {
            return Err(LockfileError::invalid(format!(
                "entry with empty name locked at {}",
                entry.locked_version
            )));
        }
        Self::new(document.manifest_digest, document.entries)
    }

    /// Render the on-disk form: pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let document = Document {
            manifest_digest: self.manifest_digest,
            entries: self.entries.clone(),
        };
        let mut json = sonic_rs::to_string_pretty(&document)?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::Credentials;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn sample() -> Lockfile {
        Lockfile::new(
            Digest::of_bytes(b"package 'nginx'"),
            vec![
                LockEntry::new(
                    "nginx",
                    Version::new(2, 7, 0),
                    &LocationSpec::index("https://index.example"),
                ),
                LockEntry::new(
                    "app",
                    Version::new(0, 1, 0),
                    &LocationSpec::path("/src/app"),
                ),
                LockEntry::new(
                    "ohai",
                    Version::new(1, 1, 0),
                    &LocationSpec::git(
                        "https://git.example/ohai.git",
                        Some("0123456789abcdef0123456789abcdef01234567"),
                    ),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn entries_are_sorted_by_name() {
        let names: Vec<_> = sample().entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["app", "nginx", "ohai"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let origin = LocationSpec::index("https://index.example");
        let err = Lockfile::new(
            Digest::of_bytes(b""),
            vec![
                LockEntry::new("nginx", Version::new(1, 0, 0), &origin),
                LockEntry::new("nginx", Version::new(2, 0, 0), &origin),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, LockfileError::DuplicatePackage { name } if name == "nginx"));
    }

    #[test]
    fn reserialization_is_byte_identical() {
        let lockfile = sample();
        let json = lockfile.to_json().unwrap();
        let parsed = Lockfile::parse(&json).unwrap();
        assert_eq!(parsed, lockfile);
        assert_eq!(parsed.to_json().unwrap(), json);
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn credentials_never_reach_the_lockfile() {
        let origin = LocationSpec::api(
            "https://api.example",
            Some(Credentials {
                client_name: "ci".to_string(),
                token: "s3cret".to_string(),
            }),
        );
        let lockfile = Lockfile::new(
            Digest::of_bytes(b""),
            vec![LockEntry::new("nginx", Version::new(1, 0, 0), &origin)],
        )
        .unwrap();
        let json = lockfile.to_json().unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("https://api.example"));
    }

    #[test]
    fn lookup_by_name() {
        let lockfile = sample();
        assert_eq!(lockfile.get("nginx").unwrap().locked_version, Version::new(2, 7, 0));
        assert!(lockfile.get("apache2").is_none());
        assert!(lockfile.matches(&Digest::of_bytes(b"package 'nginx'")));
    }

    #[test_case("{" ; "truncated")]
    #[test_case(r#"{"manifest_digest":"zz","entries":[]}"# ; "bad digest")]
    #[test_case(r#"{"entries":[]}"# ; "missing digest")]
    #[test_case("[]" ; "not an object")]
    fn malformed_documents_are_errors(content: &str) {
        assert!(Lockfile::parse(content).is_err());
    }
}
