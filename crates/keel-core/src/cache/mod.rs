//! Signature-based module cache.
//!
//! Each logical identity maps to at most one installed module. Loading the
//! same content again only bumps a reference count; loading changed content
//! swaps the installed module; the last dismissal uninstalls it.
//!
//! Modules are installed from a private copy under the container's `cache/`
//! folder, so a package file can back several identities and may also be
//! installed by the container itself.
//!
//! Loads and dismissals of one identity are serialized by a per-identity
//! mutex. The outer table lock is only held to find or drop a slot, never
//! across an install.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;

use crate::container::{ContainerResourceInstaller, ModuleContainer, ModuleHandle};
use crate::fs::{ContentSignature, SignatureCalculator};
use crate::resource::NamedVersionedResource;

#[derive(Debug)]
struct CachedModule {
    handle: ModuleHandle,
    signature: ContentSignature,
    refs: usize,
}

type Slot = Arc<Mutex<Option<CachedModule>>>;

pub struct ModuleCache<C> {
    installer: Arc<ContainerResourceInstaller<C>>,
    signer: Box<dyn SignatureCalculator>,
    slots: Mutex<HashMap<NamedVersionedResource, Slot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: ModuleContainer> ModuleCache<C> {
    pub fn new(
        installer: Arc<ContainerResourceInstaller<C>>,
        signer: impl SignatureCalculator + 'static,
    ) -> Self {
        Self {
            installer,
            signer: Box::new(signer),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn installer(&self) -> &ContainerResourceInstaller<C> {
        &self.installer
    }

    /// Load the module for `identity` from `package`, reusing the installed
    /// module when its content signature is unchanged.
    ///
    /// On an install failure the identity is left unloaded and the error
    /// is returned.
    pub fn load_module(
        &self,
        identity: &NamedVersionedResource,
        package: &Path,
    ) -> anyhow::Result<ModuleHandle> {
        let signature = self.signer.file_signature(package)?;
        let slot = self.slot(identity);

        let result = {
            let mut entry = lock(&slot);
            self.load_into(&mut entry, identity, package, signature)
        };

        self.release_slot(identity, &slot);
        result
    }

    fn load_into(
        &self,
        entry: &mut Option<CachedModule>,
        identity: &NamedVersionedResource,
        package: &Path,
        signature: ContentSignature,
    ) -> anyhow::Result<ModuleHandle> {
        match entry {
            Some(cached) if cached.signature == signature => {
                cached.refs += 1;
                tracing::debug!(module = %identity, refs = cached.refs, "Module content unchanged, reusing");
                Ok(cached.handle.clone())
            }
            Some(cached) => {
                tracing::info!(module = %identity, "Module content changed, reinstalling");
                self.installer.uninstall(&cached.handle)?;
                discard_copy(cached.handle.origin());
                let refs = cached.refs + 1;
                *entry = None;

                let handle = self.install_copy(identity, package, &signature)?;
                *entry = Some(CachedModule {
                    handle: handle.clone(),
                    signature,
                    refs,
                });
                Ok(handle)
            }
            None => {
                let handle = self.install_copy(identity, package, &signature)?;
                tracing::info!(module = %identity, "Loaded module");
                *entry = Some(CachedModule {
                    handle: handle.clone(),
                    signature,
                    refs: 1,
                });
                Ok(handle)
            }
        }
    }

    fn install_copy(
        &self,
        identity: &NamedVersionedResource,
        package: &Path,
        signature: &ContentSignature,
    ) -> anyhow::Result<ModuleHandle> {
        let copy = self.copy_package(identity, package, signature)?;
        self.installer
            .install_module(identity, &copy)
            .inspect_err(|_| discard_copy(&copy))
    }

    fn copy_package(
        &self,
        identity: &NamedVersionedResource,
        package: &Path,
        signature: &ContentSignature,
    ) -> anyhow::Result<PathBuf> {
        let copy = self.installer.layout().module_cache_file(identity, signature)?;
        if let Some(parent) = copy.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::copy(package, &copy).with_context(|| {
            format!("Failed to copy {} to {}", package.display(), copy.display())
        })?;
        Ok(copy)
    }

    /// Drop one reference to `identity`, uninstalling the module when it was
    /// the last. Dismissing an identity that is not loaded does nothing.
    ///
    /// If the final uninstall fails the module stays cached and the error is
    /// returned.
    pub fn dismiss_module(&self, identity: &NamedVersionedResource) -> anyhow::Result<()> {
        let Some(slot) = lock(&self.slots).get(identity).cloned() else {
            return Ok(());
        };

        let result = {
            let mut entry = lock(&slot);
            match entry.as_mut() {
                Some(cached) if cached.refs > 1 => {
                    cached.refs -= 1;
                    Ok(())
                }
                Some(cached) => match self.installer.uninstall(&cached.handle) {
                    Ok(()) => {
                        tracing::info!(module = %identity, "Unloaded module");
                        discard_copy(cached.handle.origin());
                        *entry = None;
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                None => Ok(()),
            }
        };

        self.release_slot(identity, &slot);
        result
    }

    /// Handle of the module loaded for `identity`, if any.
    pub fn handle(&self, identity: &NamedVersionedResource) -> Option<ModuleHandle> {
        let slot = lock(&self.slots).get(identity).cloned()?;
        let entry = lock(&slot);
        entry.as_ref().map(|cached| cached.handle.clone())
    }

    pub fn reference_count(&self, identity: &NamedVersionedResource) -> usize {
        let Some(slot) = lock(&self.slots).get(identity).cloned() else {
            return 0;
        };
        let entry = lock(&slot);
        entry.as_ref().map_or(0, |cached| cached.refs)
    }

    /// Number of identities with a loaded module.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, identity: &NamedVersionedResource) -> Slot {
        Arc::clone(lock(&self.slots).entry(identity.clone()).or_default())
    }

    /// Forget an empty slot nobody else is holding. Slots are only cloned
    /// under the table lock, so a strong count of two (table plus caller)
    /// means no other operation can reach it.
    fn release_slot(&self, identity: &NamedVersionedResource, slot: &Slot) {
        let mut slots = lock(&self.slots);
        let Some(current) = slots.get(identity) else {
            return;
        };
        if Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2 && lock(slot).is_none() {
            slots.remove(identity);
        }
    }
}

fn discard_copy(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cached module copy")
        }
    }
}
