//! Installs resources into a container's filesystem layout and, for
//! immediate-load locations, into the running module container.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::Context;

use super::layout::{ContainerLayout, parse_resource_file_name};
use super::{ModuleContainer, ModuleHandle};
use crate::deployment::ContainerResourceLocation;
use crate::fs::{Blake3SignatureCalculator, ContentSignature, SignatureCalculator};
use crate::resource::{NamedVersionedResource, NamedVersionedResourceCollection};

/// A resource present in the container layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledResource {
    pub resource: NamedVersionedResource,
    pub location: ContainerResourceLocation,
    pub signature: ContentSignature,
    pub path: PathBuf,
    /// Set when the resource is loaded in the running container.
    pub handle: Option<ModuleHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// A different payload of the same identity was replaced.
    Replaced,
    /// Identical content was already installed at the location.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub outcome: InstallOutcome,
    pub path: PathBuf,
    pub handle: Option<ModuleHandle>,
}

/// Container resource installer.
///
/// Keeps an inventory of every resource it placed (or found on disk at
/// startup) keyed by `(name, version)`.
pub struct ContainerResourceInstaller<C> {
    container: C,
    layout: ContainerLayout,
    signer: Blake3SignatureCalculator,
    installed: RwLock<HashMap<NamedVersionedResource, InstalledResource>>,
}

impl<C: ModuleContainer> ContainerResourceInstaller<C> {
    /// Attach to a container, loading every resource already present in
    /// its monitored folders.
    ///
    /// A bundle that fails to load is logged and left out of the inventory.
    pub fn open(container: C, layout: ContainerLayout) -> anyhow::Result<Self> {
        let installer = Self {
            container,
            layout,
            signer: Blake3SignatureCalculator,
            installed: RwLock::new(HashMap::new()),
        };
        installer.scan()?;
        Ok(installer)
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn layout(&self) -> &ContainerLayout {
        &self.layout
    }

    fn scan(&self) -> anyhow::Result<()> {
        let mut installed = self.installed.write().unwrap_or_else(PoisonError::into_inner);

        for location in ContainerLayout::monitored_locations() {
            let dir = self.layout.location_dir(location)?;
            if !dir.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
            files.sort_by_key(|e| e.file_name());

            for entry in files {
                let path = entry.path();
                let Some(resource) = entry.file_name().to_str().and_then(parse_resource_file_name)
                else {
                    tracing::debug!(path = %path.display(), "Skipping unrecognized file");
                    continue;
                };

                if let Some(earlier) = installed.get(&resource) {
                    tracing::warn!(
                        resource = %resource,
                        kept = %earlier.path.display(),
                        skipped = %path.display(),
                        "Skipping duplicate installed resource"
                    );
                    continue;
                }

                match self.load_existing(&resource, &path, location) {
                    Ok(record) => {
                        installed.insert(resource, record);
                    }
                    Err(e) => {
                        tracing::warn!(resource = %resource, error = %format!("{:#}", e), "Failed to load installed resource");
                    }
                }
            }
        }

        tracing::info!(count = installed.len(), root = %self.layout.root().display(), "Loaded container inventory");
        Ok(())
    }

    fn load_existing(
        &self,
        resource: &NamedVersionedResource,
        path: &Path,
        location: ContainerResourceLocation,
    ) -> anyhow::Result<InstalledResource> {
        let signature = self.signer.file_signature(path)?;
        let handle = self.install_module(resource, path)?;
        Ok(InstalledResource {
            resource: resource.clone(),
            location: self.classify_installed(&handle).unwrap_or(location),
            signature,
            path: path.to_path_buf(),
            handle: Some(handle),
        })
    }

    /// Place `payload` at `location` as `resource`.
    ///
    /// Installing byte-identical content at the same location again is a
    /// no-op. Otherwise any previous copy of the identity is unloaded and
    /// removed first. Immediate-load locations also install and start the
    /// resource in the running container; if that fails the copied file is
    /// removed and the identity is left uninstalled.
    pub fn install(
        &self,
        resource: &NamedVersionedResource,
        payload: &Path,
        location: ContainerResourceLocation,
    ) -> anyhow::Result<InstallReport> {
        let signature = self.signer.file_signature(payload)?;
        let target = self.layout.resource_file(location, resource)?;

        let mut installed = self.installed.write().unwrap_or_else(PoisonError::into_inner);

        let outcome = match installed.get_mut(resource) {
            Some(existing)
                if existing.location == location
                    && existing.signature == signature
                    && existing.path.is_file() =>
            {
                if location.is_immediate_load() && existing.handle.is_none() {
                    tracing::info!(resource = %resource, location = %location, "Reloading identical resource that is not running");
                    existing.handle = Some(self.install_module(resource, &existing.path)?);
                } else {
                    tracing::debug!(resource = %resource, location = %location, "Identical resource already installed");
                }
                return Ok(InstallReport {
                    outcome: InstallOutcome::Unchanged,
                    path: existing.path.clone(),
                    handle: existing.handle.clone(),
                });
            }
            Some(existing) => {
                if let Some(handle) = &existing.handle {
                    self.container.uninstall(handle).with_context(|| {
                        format!("Failed to unload previous copy of {}", resource)
                    })?;
                }
                if existing.path != target {
                    remove_if_exists(&existing.path)?;
                }
                installed.remove(resource);
                InstallOutcome::Replaced
            }
            None => InstallOutcome::Installed,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::copy(payload, &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                payload.display(),
                target.display()
            )
        })?;

        let handle = if location.is_immediate_load() {
            match self.install_module(resource, &target) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    if let Err(cleanup) = remove_if_exists(&target) {
                        tracing::warn!(path = %target.display(), error = %cleanup, "Failed to remove unloadable resource");
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        tracing::info!(resource = %resource, location = %location, ?outcome, "Installed container resource");

        installed.insert(
            resource.clone(),
            InstalledResource {
                resource: resource.clone(),
                location,
                signature,
                path: target.clone(),
                handle: handle.clone(),
            },
        );

        Ok(InstallReport {
            outcome,
            path: target,
            handle,
        })
    }

    /// Install `origin` into the running container and start it.
    ///
    /// A module that installs but fails to start is uninstalled again.
    pub fn install_module(
        &self,
        resource: &NamedVersionedResource,
        origin: &Path,
    ) -> anyhow::Result<ModuleHandle> {
        let handle = self
            .container
            .install(resource, origin)
            .with_context(|| format!("Failed to install {}", resource))?;

        if let Err(e) = self.start(&handle) {
            if let Err(cleanup) = self.container.uninstall(&handle) {
                tracing::warn!(resource = %resource, error = %cleanup, "Failed to uninstall module that did not start");
            }
            return Err(e);
        }

        Ok(handle)
    }

    pub fn start(&self, handle: &ModuleHandle) -> anyhow::Result<()> {
        self.container
            .start(handle)
            .with_context(|| format!("Failed to start {}", handle.resource()))
    }

    /// Uninstall a module. An inventory entry that referenced the handle is
    /// kept as staged content only.
    pub fn uninstall(&self, handle: &ModuleHandle) -> anyhow::Result<()> {
        self.container
            .uninstall(handle)
            .with_context(|| format!("Failed to uninstall {}", handle.resource()))?;

        let mut installed = self.installed.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = installed.get_mut(handle.resource()) {
            if record.handle.as_ref() == Some(handle) {
                record.handle = None;
            }
        }
        Ok(())
    }

    /// Bucket an installed module by where it was loaded from.
    pub fn classify_installed(&self, handle: &ModuleHandle) -> Option<ContainerResourceLocation> {
        self.layout.classify(handle.origin())
    }

    pub fn installed(&self, resource: &NamedVersionedResource) -> Option<InstalledResource> {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }

    /// Snapshot of resources in monitored locations, for answering queries.
    pub fn resources(&self) -> NamedVersionedResourceCollection<InstalledResource> {
        let installed = self.installed.read().unwrap_or_else(PoisonError::into_inner);
        let mut resources = NamedVersionedResourceCollection::new();
        for record in installed.values() {
            if ContainerLayout::monitored_locations().contains(&record.location) {
                resources.add_resource(
                    &record.resource.name,
                    record.resource.version.clone(),
                    record.clone(),
                );
            }
        }
        resources
    }
}

fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove file: {}", path.display())),
    }
}
