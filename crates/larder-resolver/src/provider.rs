//! The seam between the resolver and wherever package metadata lives.

use async_trait::async_trait;
use larder_core::{CachedPackage, LocationSpec, Requirement, Result, Version};

/// One version of a package offered by a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Offered version.
    pub version: Version,
    /// Location offering it.
    pub origin: LocationSpec,
}

impl Candidate {
    /// Candidate for `version` at `origin`.
    #[must_use]
    pub const fn new(version: Version, origin: LocationSpec) -> Self {
        Self { version, origin }
    }
}

/// Source of candidates and package metadata.
///
/// Implementations decide how a requirement maps onto locations; the
/// resolver only needs the candidate list and the descriptor of a chosen
/// candidate.
#[async_trait]
pub trait DependencyProvider: Send + Sync {
    /// Every version available for the requirement, highest first.
    ///
    /// When several locations offer the same version, the location
    /// registered first must come first. A name with no versions anywhere
    /// is a `NotFound` error.
    async fn candidates(&self, requirement: &Requirement) -> Result<Vec<Candidate>>;

    /// Materialize a candidate and return its parsed package.
    async fn fetch_metadata(
        &self,
        requirement: &Requirement,
        candidate: &Candidate,
    ) -> Result<CachedPackage>;
}
