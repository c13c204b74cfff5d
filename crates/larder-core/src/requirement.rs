//! Requirements and the manifest that declares them.

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::location::{Credentials, LocationSpec};
use crate::version::{Constraint, Version};
use std::collections::BTreeSet;
use std::fmt;

/// Group a requirement belongs to when none is declared.
pub const DEFAULT_GROUP: &str = "default";

/// A declared need for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package name.
    pub name: String,
    /// Acceptable versions.
    pub constraint: Constraint,
    /// Groups the requirement belongs to; empty means the default group.
    pub groups: BTreeSet<String>,
    /// Explicit location; `None` defers to the default location chain.
    pub location: Option<LocationSpec>,
}

impl Requirement {
    /// Requirement with no groups and no explicit location.
    #[must_use]
    pub fn new(name: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            name: name.into(),
            constraint,
            groups: BTreeSet::new(),
            location: None,
        }
    }

    /// Pin the requirement to a location.
    #[must_use]
    pub fn with_location(mut self, location: LocationSpec) -> Self {
        self.location = Some(location);
        self
    }

    /// Add the requirement to a group.
    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Effective groups, with the default group filled in.
    pub fn effective_groups(&self) -> impl Iterator<Item = &str> {
        let default = self.groups.is_empty().then_some(DEFAULT_GROUP);
        self.groups.iter().map(String::as_str).chain(default)
    }

    /// Whether the two requirements share at least one group.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.effective_groups()
            .any(|g| other.effective_groups().any(|o| o == g))
    }

    /// Whether the requirement is pinned to a path or git location.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.location.as_ref().is_some_and(LocationSpec::is_pin)
    }
}

/// Who introduced a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requirer {
    /// The manifest itself.
    Manifest,
    /// A resolved package's declared dependency.
    Package {
        /// Package name.
        name: String,
        /// Package version.
        version: Version,
    },
}

impl fmt::Display for Requirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => f.write_str("the manifest"),
            Self::Package { name, version } => write!(f, "{name} {version}"),
        }
    }
}

/// A constraint together with whoever imposed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSource {
    /// Package the constraint applies to.
    pub name: String,
    /// The constraint.
    pub constraint: Constraint,
    /// Its origin.
    pub required_by: Requirer,
}

impl fmt::Display for ConstraintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (required by {})",
            self.name, self.constraint, self.required_by
        )
    }
}

/// Restricts which groups are installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    /// Groups to skip.
    pub except: Vec<String>,
    /// Groups to install exclusively.
    pub only: Vec<String>,
}

impl GroupFilter {
    /// Check the filter is not contradictory.
    pub fn validate(&self) -> Result<()> {
        if !self.except.is_empty() && !self.only.is_empty() {
            return Err(Error::InvalidOptions(
                "cannot combine `except` and `only` group filters".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a requirement passes the filter.
    #[must_use]
    pub fn admits(&self, requirement: &Requirement) -> bool {
        if !self.only.is_empty() {
            return requirement
                .effective_groups()
                .any(|g| self.only.iter().any(|o| o == g));
        }
        !requirement
            .effective_groups()
            .any(|g| self.except.iter().any(|e| e == g))
    }
}

/// A parsed manifest: ordered requirements plus default locations.
#[derive(Debug, Clone)]
pub struct Manifest {
    requirements: Vec<Requirement>,
    default_locations: Vec<LocationSpec>,
    digest: Digest,
}

impl Manifest {
    /// Build a manifest, computing its digest from the source bytes.
    pub fn new(
        requirements: Vec<Requirement>,
        default_locations: Vec<LocationSpec>,
        source: &[u8],
    ) -> Result<Self> {
        let mut manifest = Self {
            requirements: Vec::with_capacity(requirements.len()),
            default_locations: Vec::new(),
            digest: Digest::of_bytes(source),
        };
        for location in default_locations {
            manifest.add_default_location(location)?;
        }
        for requirement in requirements {
            manifest.add_requirement(requirement)?;
        }
        Ok(manifest)
    }

    /// Register a default location.
    pub fn add_default_location(&mut self, location: LocationSpec) -> Result<()> {
        if self.default_locations.contains(&location) {
            return Err(Error::DuplicateLocation {
                location: location.to_string(),
            });
        }
        self.default_locations.push(location);
        Ok(())
    }

    /// Register a requirement, rejecting clashes within overlapping groups.
    pub fn add_requirement(&mut self, requirement: Requirement) -> Result<()> {
        validate_requirement(&self.requirements, &requirement)?;
        self.requirements.push(requirement);
        Ok(())
    }

    /// Requirements in declaration order.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Default locations in registration order.
    #[must_use]
    pub fn default_locations(&self) -> &[LocationSpec] {
        &self.default_locations
    }

    /// Digest of the manifest source.
    #[must_use]
    pub const fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Requirements admitted by a group filter.
    pub fn filtered(&self, filter: &GroupFilter) -> Result<Vec<Requirement>> {
        filter.validate()?;
        Ok(self
            .requirements
            .iter()
            .filter(|r| filter.admits(r))
            .cloned()
            .collect())
    }

    /// Credentials for an API endpoint, from requirements or default locations.
    #[must_use]
    pub fn credentials_for(&self, endpoint: &str) -> Option<&Credentials> {
        self.requirements
            .iter()
            .filter_map(|r| r.location.as_ref())
            .chain(self.default_locations.iter())
            .find_map(|location| match location {
                LocationSpec::Api {
                    endpoint: e,
                    credentials: Some(c),
                } if e == endpoint => Some(c),
                _ => None,
            })
    }
}

/// Check a new requirement against those already registered.
fn validate_requirement(existing: &[Requirement], requirement: &Requirement) -> Result<()> {
    for other in existing {
        if other.name != requirement.name || !other.overlaps(requirement) {
            continue;
        }
        if other.location != requirement.location {
            return Err(Error::AmbiguousLocation {
                name: requirement.name.clone(),
                first: describe(other.location.as_ref()),
                second: describe(requirement.location.as_ref()),
            });
        }
        return Err(Error::DuplicateRequirement {
            name: requirement.name.clone(),
        });
    }
    Ok(())
}

fn describe(location: Option<&LocationSpec>) -> String {
    location.map_or_else(|| "the default locations".to_string(), ToString::to_string)
}

/// Validate a whole requirement list before resolution.
pub fn validate_requirements(requirements: &[Requirement]) -> Result<()> {
    for (i, requirement) in requirements.iter().enumerate() {
        validate_requirement(&requirements[..i], requirement)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn req(name: &str) -> Requirement {
        Requirement::new(name, Constraint::any())
    }

    #[test]
    fn duplicate_in_same_group_is_rejected() {
        let err = Manifest::new(vec![req("nginx"), req("nginx")], vec![], b"").unwrap_err();
        assert!(matches!(err, Error::DuplicateRequirement { name } if name == "nginx"));
    }

    #[test]
    fn differing_locations_are_ambiguous() {
        let a = req("nginx").with_location(LocationSpec::path("/src/nginx"));
        let b = req("nginx").with_location(LocationSpec::git("https://g.example/nginx", None));
        let err = Manifest::new(vec![a, b], vec![], b"").unwrap_err();
        assert!(matches!(err, Error::AmbiguousLocation { .. }));
    }

    #[test]
    fn disjoint_groups_may_repeat_a_name() {
        let a = req("nginx").in_group("test");
        let b = req("nginx")
            .in_group("production")
            .with_location(LocationSpec::path("/src/nginx"));
        let manifest = Manifest::new(vec![a, b], vec![], b"").unwrap();
        assert_eq!(manifest.requirements().len(), 2);
    }

    #[test]
    fn duplicate_default_location_is_rejected() {
        let index = LocationSpec::index("https://index.example");
        let err = Manifest::new(vec![], vec![index.clone(), index], b"").unwrap_err();
        assert!(matches!(err, Error::DuplicateLocation { .. }));
    }

    #[test]
    fn group_filters() {
        let manifest = Manifest::new(
            vec![req("a"), req("b").in_group("test"), req("c").in_group("ci")],
            vec![],
            b"",
        )
        .unwrap();

        let except = GroupFilter {
            except: vec!["test".to_string()],
            ..GroupFilter::default()
        };
        let names: Vec<_> = manifest
            .filtered(&except)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);

        let only = GroupFilter {
            only: vec!["test".to_string(), "default".to_string()],
            ..GroupFilter::default()
        };
        let names: Vec<_> = manifest
            .filtered(&only)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let both = GroupFilter {
            except: vec!["a".to_string()],
            only: vec!["b".to_string()],
        };
        assert!(matches!(
            manifest.filtered(&both),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn digest_tracks_source_bytes() {
        let a = Manifest::new(vec![], vec![], b"cookbook 'a'").unwrap();
        let b = Manifest::new(vec![], vec![], b"cookbook 'a'").unwrap();
        let c = Manifest::new(vec![], vec![], b"cookbook 'b'").unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn credentials_come_from_matching_endpoint() {
        let creds = Credentials {
            client_name: "ci".to_string(),
            token: "t".to_string(),
        };
        let manifest = Manifest::new(
            vec![],
            vec![LocationSpec::api("https://api.example", Some(creds.clone()))],
            b"",
        )
        .unwrap();
        assert_eq!(manifest.credentials_for("https://api.example"), Some(&creds));
        assert_eq!(manifest.credentials_for("https://other.example"), None);
    }
}
