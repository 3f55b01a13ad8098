//! The runtime container a controller installs code into.
//!
//! [`ModuleContainer`] is the three-call contract every platform adapter
//! provides; [`installer::ContainerResourceInstaller`] layers the
//! filesystem layout, inventory and idempotent installs on top of it.

pub mod host;
pub mod installer;
pub mod layout;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::resource::NamedVersionedResource;

pub use host::LocalModuleHost;
pub use installer::{ContainerResourceInstaller, InstallOutcome, InstallReport, InstalledResource};
pub use layout::ContainerLayout;

/// A unit installed in a module container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHandle {
    id: u64,
    resource: NamedVersionedResource,
    origin: PathBuf,
}

impl ModuleHandle {
    pub fn new(id: u64, resource: NamedVersionedResource, origin: PathBuf) -> Self {
        Self {
            id,
            resource,
            origin,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource(&self) -> &NamedVersionedResource {
        &self.resource
    }

    /// File the unit was installed from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }
}

/// Install, start and uninstall primitives of a module container.
pub trait ModuleContainer: Send + Sync {
    fn install(
        &self,
        resource: &NamedVersionedResource,
        origin: &Path,
    ) -> anyhow::Result<ModuleHandle>;

    fn start(&self, handle: &ModuleHandle) -> anyhow::Result<()>;

    fn uninstall(&self, handle: &ModuleHandle) -> anyhow::Result<()>;
}

impl<C: ModuleContainer + ?Sized> ModuleContainer for Arc<C> {
    fn install(
        &self,
        resource: &NamedVersionedResource,
        origin: &Path,
    ) -> anyhow::Result<ModuleHandle> {
        (**self).install(resource, origin)
    }

    fn start(&self, handle: &ModuleHandle) -> anyhow::Result<()> {
        (**self).start(handle)
    }

    fn uninstall(&self, handle: &ModuleHandle) -> anyhow::Result<()> {
        (**self).uninstall(handle)
    }
}
