use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use keel_core::cache::ModuleCache;
use keel_core::container::{ContainerLayout, ContainerResourceInstaller, LocalModuleHost};
use keel_core::fs::Blake3SignatureCalculator;
use keel_core::resource::NamedVersionedResource;
use keel_core::version::Version;
use tempfile::TempDir;

const THREADS: usize = 8;
const ROUNDS: usize = 50;

fn cache(tmp: &TempDir) -> ModuleCache<LocalModuleHost> {
    let layout = ContainerLayout::new(tmp.path().join("container"), None);
    let installer = ContainerResourceInstaller::open(LocalModuleHost::new(), layout).unwrap();
    ModuleCache::new(Arc::new(installer), Blake3SignatureCalculator)
}

fn packages(tmp: &TempDir, content: impl Fn(usize) -> String) -> Vec<PathBuf> {
    (0..THREADS)
        .map(|i| {
            let path = tmp.path().join(format!("package-{i}.bundle"));
            std::fs::write(&path, content(i)).unwrap();
            path
        })
        .collect()
}

fn identity() -> NamedVersionedResource {
    NamedVersionedResource::new("activity.code", Version::new(1, 0, 0))
}

#[test]
fn concurrent_load_and_dismiss_of_identical_content() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(&tmp);
    let packages = packages(&tmp, |_| "shared module".to_string());
    let identity = identity();

    thread::scope(|scope| {
        for package in &packages {
            let cache = &cache;
            let identity = &identity;
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    let handle = cache.load_module(identity, package).unwrap();
                    assert!(cache.installer().container().is_started(&handle));
                    cache.dismiss_module(identity).unwrap();
                }
            });
        }
    });

    assert_eq!(cache.reference_count(&identity), 0);
    assert!(cache.handle(&identity).is_none());
    assert!(cache.is_empty());
    assert!(cache.installer().container().modules().is_empty());
}

#[test]
fn concurrent_loads_with_changing_content_settle() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(&tmp);
    let packages = packages(&tmp, |i| format!("module build {}", i % 2));
    let identity = identity();

    thread::scope(|scope| {
        for package in &packages {
            let cache = &cache;
            let identity = &identity;
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    cache.load_module(identity, package).unwrap();
                    cache.dismiss_module(identity).unwrap();
                }
            });
        }
    });

    assert_eq!(cache.reference_count(&identity), 0);
    assert!(cache.handle(&identity).is_none());
    assert!(cache.installer().container().modules().is_empty());
}

#[test]
fn held_references_keep_one_installed_module() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(&tmp);
    let packages = packages(&tmp, |_| "shared module".to_string());
    let identity = identity();

    let handles: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = packages
            .iter()
            .map(|package| {
                let cache = &cache;
                let identity = &identity;
                scope.spawn(move || cache.load_module(identity, package).unwrap())
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(cache.reference_count(&identity), THREADS);
    assert_eq!(cache.installer().container().modules().len(), 1);

    for _ in 0..THREADS {
        cache.dismiss_module(&identity).unwrap();
    }
    assert!(cache.installer().container().modules().is_empty());
}
