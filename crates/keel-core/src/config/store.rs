//! Config store for loading and saving keel.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{KeelConfig, parser};

pub const CONFIG_FILE_NAME: &str = "keel.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// The per-user configuration file.
    pub fn user() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("keel");
        Ok(Self::at(dir.join(CONFIG_FILE_NAME)))
    }

    pub fn at(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration; a missing file yields defaults.
    pub fn load(&self) -> anyhow::Result<KeelConfig> {
        if !self.config_path.exists() {
            return Ok(KeelConfig::new());
        }
        parser::parse_keel_toml(&self.config_path)
    }

    pub fn save(&self, config: &KeelConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
