//! Versions and version constraints.
//!
//! Versions are dotted numeric triples with an optional pre-release tag.
//! Short forms (`1`, `1.2`) and a leading `v` are accepted and padded to a
//! full triple. A pre-release sorts before its release.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Immutable, totally ordered package version.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(semver::Version);

impl Version {
    /// Build a release version from its parts.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self> {
        parse_with_precision(input).map(|(version, _)| version)
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.0.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0.minor
    }

    /// Patch component.
    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Whether the version carries a pre-release tag.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Lowest version that sorts at or above `major.minor.patch` including
    /// its pre-releases.
    fn floor_of(major: u64, minor: u64, patch: u64) -> Self {
        let mut inner = semver::Version::new(major, minor, patch);
        // "0" is the lowest possible pre-release identifier.
        inner.pre = semver::Prerelease::new("0").unwrap_or(semver::Prerelease::EMPTY);
        Self(inner)
    }

    /// Render with at most `precision` numeric segments.
    fn render(&self, precision: u8) -> String {
        if self.is_prerelease() || !self.0.build.is_empty() || precision >= 3 {
            return self.0.to_string();
        }
        match precision {
            2 => format!("{}.{}", self.0.major, self.0.minor),
            _ => format!("{}", self.0.major),
        }
    }
}

/// Parse a version and report how many numeric segments were written.
fn parse_with_precision(input: &str) -> Result<(Version, u8)> {
    let invalid = |message: &str| Error::InvalidVersion {
        input: input.to_string(),
        message: message.to_string(),
    };

    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(invalid("empty version"));
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (numeric, suffix) = trimmed.split_at(split);
    let segments: Vec<&str> = numeric.split('.').collect();
    if segments.len() > 3 {
        return Err(invalid("more than three numeric segments"));
    }
    if segments
        .iter()
        .any(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid("segments must be numeric"));
    }

    let mut padded = segments.join(".");
    for _ in segments.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    let inner = semver::Version::parse(&padded).map_err(|e| invalid(&e.to_string()))?;
    Ok((Version(inner), segments.len() as u8))
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Matches every version.
    Any,
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `~>`: at least the version, below the next release at the written precision.
    Pessimistic,
}

impl Operator {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Any | Self::Ge => ">=",
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Pessimistic => "~>",
        }
    }
}

/// A predicate over versions.
///
/// ```
/// use larder_core::{Constraint, Version};
///
/// let c: Constraint = "~> 1.2.0".parse().unwrap();
/// assert!(c.satisfies(&Version::new(1, 2, 5)));
/// assert!(!c.satisfies(&Version::new(1, 3, 0)));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    op: Operator,
    version: Version,
    precision: u8,
}

impl Constraint {
    /// Constraint accepting every version.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            op: Operator::Any,
            version: Version::new(0, 0, 0),
            precision: 3,
        }
    }

    /// Constraint accepting exactly `version`.
    #[must_use]
    pub fn exact(version: &Version) -> Self {
        Self {
            op: Operator::Eq,
            version: version.clone(),
            precision: 3,
        }
    }

    /// Parse a constraint string such as `~> 1.2`, `>= 1.0.0` or `1.4.1`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        const OPERATORS: [(&str, Operator); 6] = [
            ("~>", Operator::Pessimistic),
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            ("=", Operator::Eq),
            (">", Operator::Gt),
            ("<", Operator::Lt),
        ];

        let (op, rest) = OPERATORS
            .iter()
            .find_map(|(symbol, op)| trimmed.strip_prefix(symbol).map(|rest| (*op, rest)))
            .unwrap_or((Operator::Eq, trimmed));

        let (version, precision) =
            parse_with_precision(rest.trim()).map_err(|e| Error::InvalidConstraint {
                input: input.to_string(),
                message: e.to_string(),
            })?;

        if op == Operator::Ge && version == Version::new(0, 0, 0) {
            return Ok(Self::any());
        }

        Ok(Self {
            op,
            version,
            precision,
        })
    }

    /// The constraint operator.
    #[must_use]
    pub const fn operator(&self) -> Operator {
        self.op
    }

    /// The version the operator applies to.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// The pinned version, for `=` constraints.
    #[must_use]
    pub fn as_exact(&self) -> Option<&Version> {
        (self.op == Operator::Eq).then_some(&self.version)
    }

    /// Whether every version is accepted.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.op == Operator::Any
    }

    /// Check whether `candidate` satisfies this constraint.
    #[must_use]
    pub fn satisfies(&self, candidate: &Version) -> bool {
        let ord = candidate.cmp(&self.version);
        match self.op {
            Operator::Any => true,
            Operator::Eq => ord == Ordering::Equal,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
            Operator::Lt => ord == Ordering::Less,
            Operator::Le => ord != Ordering::Greater,
            Operator::Pessimistic => {
                ord != Ordering::Less && self.upper_bound().is_none_or(|bound| *candidate < bound)
            }
        }
    }

    /// Exclusive upper bound of a pessimistic constraint, `None` when the
    /// bumped segment would overflow.
    fn upper_bound(&self) -> Option<Version> {
        let v = &self.version;
        if self.precision >= 3 {
            let minor = v.minor().checked_add(1)?;
            Some(Version::floor_of(v.major(), minor, 0))
        } else {
            let major = v.major().checked_add(1)?;
            Some(Version::floor_of(major, 0, 0))
        }
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operator::Any => f.write_str(">= 0.0.0"),
            op => write!(f, "{} {}", op.symbol(), self.version.render(self.precision)),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constraint({self})")
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
