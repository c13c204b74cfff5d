//! Core types for the Larder cookbook dependency manager.
//!
//! This crate provides the foundational types shared by every other crate:
//! - Versions and version constraints
//! - Location specifications and requirements
//! - The manifest and its digest
//! - Package descriptors and materialized packages
//! - The error taxonomy

pub mod error;
mod digest;
mod location;
mod package;
mod requirement;
mod version;

pub use digest::Digest;
pub use error::{Error, ErrorCode, Result};
pub use location::{Credentials, LocationKind, LocationSpec};
pub use package::{CachedPackage, DESCRIPTOR_FILE, PackageDescriptor};
pub use requirement::{
    ConstraintSource, DEFAULT_GROUP, GroupFilter, Manifest, Requirement, Requirer,
    validate_requirements,
};
pub use version::{Constraint, Operator, Version};

pub use ahash::{AHashMap, AHashSet};
