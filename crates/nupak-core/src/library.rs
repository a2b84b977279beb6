//! Library kinds, resolved identities, and dependency keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::range::VersionRange;
use crate::version::Version;

/// The kind of library a resolved item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LibraryKind {
    Project,
    Package,
    ExternalProject,
    Reference,
    Assembly,
}

impl LibraryKind {
    /// Projects are unique per id, so version-range constraints do not
    /// apply to them.
    pub fn bypasses_ranges(self) -> bool {
        matches!(self, Self::Project | Self::ExternalProject)
    }
}

/// Bitmask of library kinds a dependency is allowed to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTargets(u8);

impl DependencyTargets {
    pub const NONE: Self = Self(0);
    pub const PROJECT: Self = Self(1);
    pub const PACKAGE: Self = Self(1 << 1);
    pub const EXTERNAL_PROJECT: Self = Self(1 << 2);
    pub const REFERENCE: Self = Self(1 << 3);
    pub const ASSEMBLY: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    pub fn from_kind(kind: LibraryKind) -> Self {
        match kind {
            LibraryKind::Project => Self::PROJECT,
            LibraryKind::Package => Self::PACKAGE,
            LibraryKind::ExternalProject => Self::EXTERNAL_PROJECT,
            LibraryKind::Reference => Self::REFERENCE,
            LibraryKind::Assembly => Self::ASSEMBLY,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, kind: LibraryKind) -> bool {
        self.intersects(Self::from_kind(kind))
    }
}

impl Default for DependencyTargets {
    fn default() -> Self {
        Self::ALL
    }
}

/// A concrete resolved library: name, version, kind. The version is absent
/// for unresolved entries and projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryIdentity {
    pub name: String,
    pub version: Option<Version>,
    pub kind: LibraryKind,
}

impl LibraryIdentity {
    pub fn package(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
            kind: LibraryKind::Package,
        }
    }

    pub fn project(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            kind: LibraryKind::Project,
        }
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(ref version) => write!(f, "{} {version}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// What a node asked for: a name, a requested range, and the kinds of
/// library allowed to satisfy it.
///
/// Names compare case-insensitively for keying but keep their declared
/// casing for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyKey {
    pub name: String,
    pub range: Option<VersionRange>,
    pub targets: DependencyTargets,
}

impl DependencyKey {
    pub fn new(name: impl Into<String>, range: Option<VersionRange>) -> Self {
        Self {
            name: name.into(),
            range,
            targets: DependencyTargets::ALL,
        }
    }

    pub fn with_targets(mut self, targets: DependencyTargets) -> Self {
        self.targets = targets;
        self
    }

    /// Lowercased name, used to key same-name candidate sets.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl PartialEq for DependencyKey {
    fn eq(&self, other: &Self) -> bool {
        self.name.to_lowercase() == other.name.to_lowercase()
            && self.range == other.range
            && self.targets == other.targets
    }
}

impl Eq for DependencyKey {}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range {
            Some(ref range) => write!(f, "{} {range}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
