//! Configuration management for the appbox CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Cli;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Console login for appliance images
    pub appliance: ApplianceConfig,
    /// Directory holding downloaded images
    pub images: String,
    /// Hypervisor connection configuration
    pub libvirt: LibvirtConfig,
    /// Release repositories, one per stream
    pub repositories: RepositoriesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            appliance: ApplianceConfig::default(),
            images: "~/appbox/images".to_string(),
            libvirt: LibvirtConfig::default(),
            repositories: RepositoriesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Default config file location: `~/.config/appbox/config.yaml`.
    pub fn default_path() -> PathBuf {
        expand_tilde("~/.config/appbox/config.yaml")
    }

    /// Write the default configuration to `path`, creating parent
    /// directories as needed.
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(&Config::default())
            .with_context(|| "Failed to serialize default config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(ref url) = cli.url {
            self.libvirt.driver = url.clone();
        }

        if cli.dev {
            self.libvirt.backend = Backend::Mock;
        }

        self
    }

    /// The image directory with `~` expanded.
    pub fn images_dir(&self) -> PathBuf {
        expand_tilde(&self.images)
    }

    /// The storage pool path with `~` expanded.
    pub fn pool_path(&self) -> PathBuf {
        expand_tilde(&self.libvirt.storage_pool.path)
    }
}

/// Console login for appliance images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplianceConfig {
    pub username: String,
    pub password: String,
}

impl Default for ApplianceConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: "smartvm".to_string(),
        }
    }
}

/// Hypervisor connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibvirtConfig {
    /// Libvirt connection URI
    pub driver: String,
    /// Backend type
    pub backend: Backend,
    /// Storage pool for appliance disks
    pub storage_pool: StoragePoolConfig,
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        Self {
            driver: "qemu:///system".to_string(),
            backend: Backend::Libvirt,
            storage_pool: StoragePoolConfig::default(),
        }
    }
}

/// Hypervisor backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Libvirt/QEMU backend
    Libvirt,
    /// In-memory mock for development and testing
    Mock,
}

impl Default for Backend {
    fn default() -> Self {
        Self::Libvirt
    }
}

/// Storage pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePoolConfig {
    pub name: String,
    pub path: String,
}

impl Default for StoragePoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            path: "/var/lib/libvirt/images".to_string(),
        }
    }
}

/// Release repositories keyed by stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoriesConfig {
    pub community: RepositoryConfig,
    pub enterprise: RepositoryConfig,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            community: RepositoryConfig {
                url: "http://releases.manageiq.org".to_string(),
                versions: Vec::new(),
            },
            enterprise: RepositoryConfig::default(),
        }
    }
}

/// One release repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Base URL of the release listing
    pub url: String,
    /// Known versions, newest last; informational only
    pub versions: Vec<String>,
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
