//! Configuration schema for keel.toml

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::container::ContainerLayout;

/// Root configuration structure for keel.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeelConfig {
    /// The controller's container install
    #[serde(default)]
    pub container: ContainerConfig,

    /// The master's resource repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryConfig>,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container filesystem root
    #[serde(default = "default_container_root")]
    pub root: PathBuf,

    /// Configuration folder; without it the CONFIG location is unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,

    /// Where fetched payloads wait before install (default `<root>/tmp/staging`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    /// Where live activities are unpacked (default `<root>/activities`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activities_dir: Option<PathBuf>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            root: default_container_root(),
            config_dir: None,
            staging_dir: None,
            activities_dir: None,
        }
    }
}

impl ContainerConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.root.join("tmp").join("staging"))
    }

    pub fn activities_dir(&self) -> PathBuf {
        self.activities_dir
            .clone()
            .unwrap_or_else(|| self.root.join("activities"))
    }

    pub fn layout(&self) -> ContainerLayout {
        ContainerLayout::new(self.root.clone(), self.config_dir.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Directory holding `<name>/<version>.bundle` files
    pub root: PathBuf,

    /// URI prefix controllers fetch resources from; `file://` URIs of
    /// `root` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,
}

impl RepositoryConfig {
    pub fn base_uri(&self) -> anyhow::Result<Option<Url>> {
        self.base_uri
            .as_deref()
            .map(|uri| Url::parse(uri).with_context(|| format!("Invalid repository base_uri: {}", uri)))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Commit dependencies without asking the controller first
    #[serde(default = "default_true")]
    pub always_send_dependencies: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            always_send_dependencies: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_container_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keel")
        .join("container")
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl KeelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.container.root.as_os_str().is_empty() {
            anyhow::bail!("Invalid [container]: root must not be empty");
        }
        for (key, path) in [
            ("config_dir", &self.container.config_dir),
            ("staging_dir", &self.container.staging_dir),
            ("activities_dir", &self.container.activities_dir),
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                anyhow::bail!("Invalid [container]: {} must not be empty", key);
            }
        }

        if let Some(repository) = &self.repository {
            if repository.root.as_os_str().is_empty() {
                anyhow::bail!("Invalid [repository]: root must not be empty");
            }
            repository
                .base_uri()
                .context("Invalid [repository] configuration")?;
        }

        if self.logging.filter.trim().is_empty() {
            anyhow::bail!("Invalid [logging]: filter must not be empty");
        }

        Ok(())
    }
}
