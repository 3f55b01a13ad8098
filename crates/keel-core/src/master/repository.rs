//! The master's resource repository.
//!
//! Resources live at `<root>/<name>/<version>.bundle` and are published to
//! controllers as `<base_uri>/<name>/<version>.bundle`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use url::Url;

use crate::config::RepositoryConfig;
use crate::container::layout::RESOURCE_FILE_EXTENSION;
use crate::resource::{NamedVersionedResource, NamedVersionedResourceCollection, ResourceDependency};
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryResource {
    pub resource: NamedVersionedResource,
    pub path: PathBuf,
    pub uri: Url,
}

#[derive(Debug)]
pub struct ResourceRepository {
    root: PathBuf,
    base_uri: Url,
    resources: NamedVersionedResourceCollection<RepositoryResource>,
}

impl ResourceRepository {
    /// An empty repository.
    pub fn new(root: impl Into<PathBuf>, base_uri: Url) -> Self {
        Self {
            root: root.into(),
            base_uri: with_trailing_slash(base_uri),
            resources: NamedVersionedResourceCollection::new(),
        }
    }

    /// Index every resource under `root`. Files that do not follow the
    /// repository naming are skipped.
    pub fn scan(root: impl Into<PathBuf>, base_uri: Url) -> anyhow::Result<Self> {
        let mut repository = Self::new(root, base_uri);
        if !repository.root.is_dir() {
            anyhow::bail!(
                "Resource repository not found: {}",
                repository.root.display()
            );
        }

        for name_dir in sorted_entries(&repository.root)? {
            if !name_dir.is_dir() {
                continue;
            }
            let Some(name) = name_dir.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };

            for file in sorted_entries(&name_dir)? {
                let version = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(RESOURCE_FILE_EXTENSION))
                    .and_then(|n| n.strip_suffix('.'))
                    .and_then(|v| Version::parse(v).ok());
                match version {
                    Some(version) if file.is_file() => {
                        repository.add_resource(&name, version, file)?;
                    }
                    _ => tracing::debug!(path = %file.display(), "Skipping non-resource file"),
                }
            }
        }

        tracing::info!(
            root = %repository.root.display(),
            resources = repository.resources.len(),
            "Scanned resource repository"
        );
        Ok(repository)
    }

    /// Scan the configured repository, published under its `base_uri` or
    /// through `file://` URIs when none is set.
    pub fn from_config(config: &RepositoryConfig) -> anyhow::Result<Self> {
        match config.base_uri()? {
            Some(base_uri) => Self::scan(&config.root, base_uri),
            None => Self::scan_local(&config.root),
        }
    }

    /// Scan `root` and publish it through `file://` URIs.
    pub fn scan_local(root: &Path) -> anyhow::Result<Self> {
        let absolute = std::path::absolute(root)
            .with_context(|| format!("Failed to resolve path: {}", root.display()))?;
        let base_uri = Url::from_directory_path(&absolute)
            .map_err(|()| anyhow::anyhow!("Cannot express {} as a URI", absolute.display()))?;
        Self::scan(absolute, base_uri)
    }

    pub fn add_resource(
        &mut self,
        name: &str,
        version: Version,
        path: PathBuf,
    ) -> anyhow::Result<()> {
        let relative = format!("{}/{}.{}", name, version, RESOURCE_FILE_EXTENSION);
        let uri = self
            .base_uri
            .join(&relative)
            .with_context(|| format!("Failed to build URI for {}", relative))?;
        let resource = NamedVersionedResource::new(name, version.clone());
        self.resources
            .add_resource(name, version, RepositoryResource { resource, path, uri });
        Ok(())
    }

    /// Highest repository resource satisfying `dependency`.
    pub fn resolve(&self, dependency: &ResourceDependency) -> Option<&RepositoryResource> {
        self.resources
            .get_resource_in_range(&dependency.name, &dependency.version_range)
    }

    pub fn resources(&self) -> &NamedVersionedResourceCollection<RepositoryResource> {
        &self.resources
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }
}

fn with_trailing_slash(mut uri: Url) -> Url {
    if !uri.path().ends_with('/') {
        let path = format!("{}/", uri.path());
        uri.set_path(&path);
    }
    uri
}

fn sorted_entries(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}
