//! Lockfile reconciliation: decide what a run may reuse.
//!
//! Every run lands in exactly one [`LockState`]:
//!
//! | state          | when                                            | outcome                            |
//! |----------------|-------------------------------------------------|------------------------------------|
//! | `Unlocked`     | no lockfile, or a full update was requested     | resolve everything                 |
//! | `LockedClean`  | digest matches and no update was requested      | install the lock entries verbatim  |
//! | `LockedStale`  | digest differs, or named packages are updated   | reuse what still fits, resolve the rest |
//!
//! A stale lockfile never silently moves a package: a locked version that
//! no longer satisfies its manifest constraint is an
//! [`Error::OutdatedSourceConflict`] until the user updates it explicitly.

use larder_core::{
    Constraint, Error, LocationSpec, Manifest, Requirement, Result, Version,
};
use larder_location::is_revision;
use larder_lockfile::{LockEntry, Lockfile};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Relationship between the manifest and its lockfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Nothing to reuse.
    Unlocked,
    /// The lockfile was written for this exact manifest.
    LockedClean,
    /// The lockfile is partially reusable.
    LockedStale,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unlocked => "unlocked",
            Self::LockedClean => "locked-clean",
            Self::LockedStale => "locked-stale",
        })
    }
}

/// Which packages may move away from their locked versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpdateScope {
    /// Keep every lock that still fits.
    #[default]
    None,
    /// Ignore the lockfile.
    All,
    /// Re-resolve only these names.
    Only(BTreeSet<String>),
}

impl UpdateScope {
    /// Update only the given names.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    /// Whether `name` is released from its lock.
    #[must_use]
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(names) => names.contains(name),
        }
    }
}

/// Outcome of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// State the run is in.
    pub state: LockState,
    /// Requirements to resolve. Empty when clean.
    pub requirements: Vec<Requirement>,
    /// Final assignment when clean, credentials re-attached. Empty otherwise.
    pub locked: Vec<LockEntry>,
    /// Versions the resolver should try first.
    pub preferred: BTreeMap<String, Version>,
    /// Top-level names kept at their locked version.
    pub reused: Vec<String>,
}

impl ReconcilePlan {
    fn resolve_all(manifest: &Manifest) -> Self {
        Self {
            state: LockState::Unlocked,
            requirements: manifest.requirements().to_vec(),
            locked: Vec::new(),
            preferred: BTreeMap::new(),
            reused: Vec::new(),
        }
    }
}

/// Compares a manifest with its lockfile.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    manifest: &'a Manifest,
}

impl<'a> Reconciler<'a> {
    /// Reconciler for `manifest`.
    #[must_use]
    pub const fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }

    /// Classify the run and derive what to resolve.
    pub fn reconcile(
        &self,
        lockfile: Option<&Lockfile>,
        scope: &UpdateScope,
    ) -> Result<ReconcilePlan> {
        self.check_scope(lockfile, scope)?;

        let plan = match lockfile {
            None => ReconcilePlan::resolve_all(self.manifest),
            Some(_) if *scope == UpdateScope::All => ReconcilePlan::resolve_all(self.manifest),
            Some(lockfile) if self.is_clean(lockfile, scope) => self.clean(lockfile),
            Some(lockfile) => self.stale(lockfile, scope)?,
        };
        info!(
            state = %plan.state,
            resolve = plan.requirements.len(),
            reused = plan.reused.len(),
            preferred = plan.preferred.len(),
            "reconciled lockfile"
        );
        Ok(plan)
    }

    fn check_scope(&self, lockfile: Option<&Lockfile>, scope: &UpdateScope) -> Result<()> {
        let UpdateScope::Only(names) = scope else {
            return Ok(());
        };
        if names.is_empty() {
            return Err(Error::InvalidOptions(
                "no package names given to update".to_string(),
            ));
        }
        for name in names {
            let declared = self.manifest.requirements().iter().any(|r| &r.name == name);
            let locked = lockfile.is_some_and(|l| l.get(name).is_some());
            if !declared && !locked {
                return Err(Error::InvalidOptions(format!(
                    "cannot update '{name}': it is neither declared nor locked"
                )));
            }
        }
        Ok(())
    }

    fn is_clean(&self, lockfile: &Lockfile, scope: &UpdateScope) -> bool {
        if *scope != UpdateScope::None || !lockfile.matches(self.manifest.digest()) {
            return false;
        }
        let missing = self
            .manifest
            .requirements()
            .iter()
            .find(|r| lockfile.get(&r.name).is_none());
        if let Some(requirement) = missing {
            debug!(name = %requirement.name, "digest matches but the lockfile lacks a package");
            return false;
        }
        true
    }

    fn clean(&self, lockfile: &Lockfile) -> ReconcilePlan {
        let locked = lockfile
            .entries()
            .iter()
            .map(|entry| LockEntry {
                origin: attach_credentials(&entry.origin, self.manifest),
                ..entry.clone()
            })
            .collect();
        ReconcilePlan {
            state: LockState::LockedClean,
            requirements: Vec::new(),
            locked,
            preferred: BTreeMap::new(),
            reused: self
                .manifest
                .requirements()
                .iter()
                .map(|r| r.name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    fn stale(&self, lockfile: &Lockfile, scope: &UpdateScope) -> Result<ReconcilePlan> {
        let mut requirements = Vec::with_capacity(self.manifest.requirements().len());
        let mut reused = BTreeSet::new();

        for requirement in self.manifest.requirements() {
            let name = &requirement.name;
            if scope.includes(name) {
                debug!(name = %name, "released for update");
                requirements.push(requirement.clone());
                continue;
            }
            // Path packages are live; whatever is on disk now wins.
            if matches!(requirement.location, Some(LocationSpec::Path { .. })) {
                requirements.push(requirement.clone());
                continue;
            }
            let Some(entry) = lockfile.get(name) else {
                debug!(name = %name, "not locked yet");
                requirements.push(requirement.clone());
                continue;
            };
            if !same_location(requirement.location.as_ref(), &entry.origin) {
                debug!(name = %name, locked = %entry.origin, "location changed");
                requirements.push(requirement.clone());
                continue;
            }
            if !requirement.constraint.satisfies(&entry.locked_version) {
                return Err(Error::OutdatedSourceConflict {
                    name: name.clone(),
                    locked_version: entry.locked_version.clone(),
                    constraint: requirement.constraint.clone(),
                });
            }

            requirements.push(Requirement {
                name: name.clone(),
                constraint: Constraint::exact(&entry.locked_version),
                groups: requirement.groups.clone(),
                location: Some(attach_credentials(&entry.origin, self.manifest)),
            });
            reused.insert(name.clone());
        }

        let preferred = lockfile
            .entries()
            .iter()
            .filter(|e| !reused.contains(&e.name) && !scope.includes(&e.name))
            .filter(|e| !matches!(e.origin, LocationSpec::Path { .. }))
            .map(|e| (e.name.clone(), e.locked_version.clone()))
            .collect();

        Ok(ReconcilePlan {
            state: LockState::LockedStale,
            requirements,
            locked: Vec::new(),
            preferred,
            reused: reused.into_iter().collect(),
        })
    }
}

/// Whether a locked origin still answers for the declared location.
fn same_location(declared: Option<&LocationSpec>, locked: &LocationSpec) -> bool {
    match (declared, locked) {
        (None, locked) => !locked.is_pin(),
        (
            Some(LocationSpec::Git { uri, reference }),
            LocationSpec::Git {
                uri: locked_uri,
                reference: locked_revision,
            },
        ) => {
            uri == locked_uri
                && match reference {
                    Some(r) if is_revision(r) => locked_revision
                        .as_deref()
                        .is_some_and(|l| l.eq_ignore_ascii_case(r)),
                    _ => true,
                }
        }
        (Some(declared), locked) => {
            declared.kind() == locked.kind()
                && declared.endpoint().is_some()
                && declared.endpoint() == locked.endpoint()
        }
    }
}

/// Restore the credentials the lockfile never stores.
#[must_use]
pub fn attach_credentials(origin: &LocationSpec, manifest: &Manifest) -> LocationSpec {
    match origin {
        LocationSpec::Api {
            endpoint,
            credentials: None,
        } => LocationSpec::api(endpoint, manifest.credentials_for(endpoint).cloned()),
        other => other.clone(),
    }
}
