//! Named, versioned resources and the collections that resolve them.

pub mod collection;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::{Version, VersionRange};

pub use collection::{NamedVersionedResourceCollection, VersionedResourceCollection};

/// Identity of a resource: its name and exact version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamedVersionedResource {
    pub name: String,
    pub version: Version,
}

impl NamedVersionedResource {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for NamedVersionedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A requirement on some version of a named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDependency {
    pub name: String,
    #[serde(rename = "versionRange")]
    pub version_range: VersionRange,
}

impl ResourceDependency {
    pub fn new(name: impl Into<String>, version_range: VersionRange) -> Self {
        Self {
            name: name.into(),
            version_range,
        }
    }
}

impl fmt::Display for ResourceDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version_range)
    }
}
