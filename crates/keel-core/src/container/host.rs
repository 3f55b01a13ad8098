//! In-process module host.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ModuleContainer, ModuleHandle};
use crate::resource::NamedVersionedResource;

#[derive(Debug)]
struct HostedModule {
    handle: ModuleHandle,
    started: bool,
}

/// Tracks installed and started modules for a container running in this
/// process. At most one module may be installed per origin file.
#[derive(Debug, Default)]
pub struct LocalModuleHost {
    next_id: AtomicU64,
    modules: Mutex<HashMap<u64, HostedModule>>,
}

impl LocalModuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, HostedModule>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_installed(&self, handle: &ModuleHandle) -> bool {
        self.lock().contains_key(&handle.id())
    }

    pub fn is_started(&self, handle: &ModuleHandle) -> bool {
        self.lock()
            .get(&handle.id())
            .is_some_and(|module| module.started)
    }

    /// Installed modules, oldest first.
    pub fn modules(&self) -> Vec<ModuleHandle> {
        let mut handles: Vec<ModuleHandle> =
            self.lock().values().map(|m| m.handle.clone()).collect();
        handles.sort_by_key(ModuleHandle::id);
        handles
    }
}

impl ModuleContainer for LocalModuleHost {
    fn install(
        &self,
        resource: &NamedVersionedResource,
        origin: &Path,
    ) -> anyhow::Result<ModuleHandle> {
        if !origin.is_file() {
            anyhow::bail!(
                "Cannot install {}: module file not found: {}",
                resource,
                origin.display()
            );
        }

        let mut modules = self.lock();
        if let Some(existing) = modules.values().find(|m| m.handle.origin() == origin) {
            anyhow::bail!(
                "Cannot install {}: {} is already installed from {}",
                resource,
                existing.handle.resource(),
                origin.display()
            );
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = ModuleHandle::new(id, resource.clone(), origin.to_path_buf());
        modules.insert(
            id,
            HostedModule {
                handle: handle.clone(),
                started: false,
            },
        );

        tracing::debug!(module = %resource, id, origin = %origin.display(), "Installed module");
        Ok(handle)
    }

    fn start(&self, handle: &ModuleHandle) -> anyhow::Result<()> {
        let mut modules = self.lock();
        let Some(module) = modules.get_mut(&handle.id()) else {
            anyhow::bail!("Cannot start {}: module is not installed", handle.resource());
        };
        module.started = true;
        Ok(())
    }

    fn uninstall(&self, handle: &ModuleHandle) -> anyhow::Result<()> {
        if self.lock().remove(&handle.id()).is_none() {
            anyhow::bail!(
                "Cannot uninstall {}: module is not installed",
                handle.resource()
            );
        }
        tracing::debug!(module = %handle.resource(), id = handle.id(), "Uninstalled module");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use tempfile::TempDir;

    fn resource(name: &str) -> NamedVersionedResource {
        NamedVersionedResource::new(name, Version::new(1, 0, 0))
    }

    #[test]
    fn test_install_start_uninstall() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a-1.0.0.bundle");
        std::fs::write(&file, b"a").unwrap();
        let host = LocalModuleHost::new();

        let handle = host.install(&resource("a"), &file).unwrap();
        assert!(host.is_installed(&handle));
        assert!(!host.is_started(&handle));

        host.start(&handle).unwrap();
        assert!(host.is_started(&handle));

        host.uninstall(&handle).unwrap();
        assert!(!host.is_installed(&handle));
        assert!(host.modules().is_empty());
    }

    #[test]
    fn test_uninstall_unknown_handle_fails() {
        let host = LocalModuleHost::new();
        let handle = ModuleHandle::new(99, resource("ghost"), "/nowhere".into());
        assert!(host.uninstall(&handle).is_err());
        assert!(host.start(&handle).is_err());
    }

    #[test]
    fn test_same_origin_cannot_be_installed_twice() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a-1.0.0.bundle");
        std::fs::write(&file, b"a").unwrap();
        let host = LocalModuleHost::new();

        let first = host.install(&resource("a"), &file).unwrap();
        assert!(host.install(&resource("a"), &file).is_err());

        host.uninstall(&first).unwrap();
        let second = host.install(&resource("a"), &file).unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let host = LocalModuleHost::new();
        assert!(host.install(&resource("a"), &tmp.path().join("missing")).is_err());
    }
}
