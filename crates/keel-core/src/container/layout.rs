//! Filesystem layout of a container install.

use std::path::{Component, Path, PathBuf};

use crate::deployment::ContainerResourceLocation;
use crate::fs::{ContentSignature, ensure_plain_name};
use crate::resource::NamedVersionedResource;
use crate::version::Version;

pub const RESOURCE_FILE_EXTENSION: &str = "bundle";

const SYSTEM_BOOTSTRAP_DIR: &str = "bootstrap";
const USER_BOOTSTRAP_DIR: &str = "startup";
const CONFIG_SUBDIR: &str = "keel";
const LIB_SYSTEM_DIR: &str = "lib/system";
const MODULE_CACHE_DIR: &str = "cache";

/// Maps resource locations onto folders under the container root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    root: PathBuf,
    config_dir: Option<PathBuf>,
}

impl ContainerLayout {
    pub fn new(root: impl Into<PathBuf>, config_dir: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locations the container loads code from, in load order.
    pub fn monitored_locations() -> [ContainerResourceLocation; 2] {
        [
            ContainerResourceLocation::SystemBootstrap,
            ContainerResourceLocation::UserBootstrap,
        ]
    }

    pub fn location_dir(&self, location: ContainerResourceLocation) -> anyhow::Result<PathBuf> {
        Ok(match location {
            ContainerResourceLocation::SystemBootstrap => self.root.join(SYSTEM_BOOTSTRAP_DIR),
            ContainerResourceLocation::UserBootstrap => self.root.join(USER_BOOTSTRAP_DIR),
            ContainerResourceLocation::Config => match &self.config_dir {
                Some(dir) => dir.join(CONFIG_SUBDIR),
                None => anyhow::bail!(
                    "Container at {} has no configuration folder",
                    self.root.display()
                ),
            },
            ContainerResourceLocation::LibSystem => self.root.join(LIB_SYSTEM_DIR),
            ContainerResourceLocation::Root => self.root.clone(),
        })
    }

    pub fn resource_file(
        &self,
        location: ContainerResourceLocation,
        resource: &NamedVersionedResource,
    ) -> anyhow::Result<PathBuf> {
        ensure_plain_name("resource name", &resource.name)?;
        Ok(self.location_dir(location)?.join(resource_file_name(resource)))
    }

    /// Private copy a module cache loads `resource` from, named by content
    /// so each identity and payload gets its own origin.
    pub fn module_cache_file(
        &self,
        resource: &NamedVersionedResource,
        signature: &ContentSignature,
    ) -> anyhow::Result<PathBuf> {
        ensure_plain_name("resource name", &resource.name)?;
        let digest: String = signature.as_str().chars().take(16).collect();
        Ok(self.root.join(MODULE_CACHE_DIR).join(format!(
            "{}-{}.{}.{}",
            resource.name, resource.version, digest, RESOURCE_FILE_EXTENSION
        )))
    }

    /// Bucket an installed unit's origin into a monitored location.
    ///
    /// Only paths directly inside the container's bootstrap or startup
    /// folder are classified; anything else is not monitored.
    pub fn classify(&self, origin: &Path) -> Option<ContainerResourceLocation> {
        let relative = origin.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();
        let folder = match components.next()? {
            Component::Normal(folder) => folder,
            _ => return None,
        };
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return None,
        }

        if folder == SYSTEM_BOOTSTRAP_DIR {
            Some(ContainerResourceLocation::SystemBootstrap)
        } else if folder == USER_BOOTSTRAP_DIR {
            Some(ContainerResourceLocation::UserBootstrap)
        } else {
            None
        }
    }
}

/// `<name>-<version>.bundle`
pub fn resource_file_name(resource: &NamedVersionedResource) -> String {
    format!(
        "{}-{}.{}",
        resource.name, resource.version, RESOURCE_FILE_EXTENSION
    )
}

/// Inverse of [`resource_file_name`]. The version is everything after the
/// last `-`, so names may themselves contain dashes.
pub fn parse_resource_file_name(file_name: &str) -> Option<NamedVersionedResource> {
    let stem = file_name
        .strip_suffix(RESOURCE_FILE_EXTENSION)?
        .strip_suffix('.')?;
    let (name, version) = stem.rsplit_once('-')?;
    if name.is_empty() {
        return None;
    }
    let version = Version::parse(version).ok()?;
    Some(NamedVersionedResource::new(name, version))
}
