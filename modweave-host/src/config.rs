//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/modweave/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use modweave_runtime::{Capability, CapabilitySet, DependencyResolver, PermissionManager};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Host-specific configuration
    pub host: HostConfig,
    /// Permission policy applied to every mod
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// Load order settings
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Game version mods are checked against
    /// Default: "1.0.0"
    pub game_version: String,
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
    /// Directory scanned for mods
    /// If None, uses XDG_DATA_HOME/modweave/mods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mods_dir: Option<PathBuf>,
}

/// Permission policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermissionsConfig {
    /// Only grant capabilities a mod declares
    /// Default: false
    #[serde(default)]
    pub explicit: bool,
    /// Capabilities the host grants
    /// If None, every known capability is granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted: Option<Vec<String>>,
}

/// Load order settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Whether optional dependencies that are installed load first
    /// Default: true
    #[serde(default = "default_true")]
    pub optional_ordering: bool,
}

fn default_true() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            game_version: "1.0.0".to_string(),
            log_level: "info".to_string(),
            mods_dir: None,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            optional_ordering: true,
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/modweave/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "modweave", "modweave")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# modweave Host Configuration

[host]
# Game version mods must list in their game_versions
# Default: "1.0.0"
game_version = "1.0.0"

# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set
# Default: "info"
log_level = "info"

# Directory scanned for mods, one sub-directory per mod holding a mod.toml
# If not specified, defaults to $XDG_DATA_HOME/modweave/mods
# mods_dir = "/path/to/mods"

[permissions]
# When true, a mod only receives the capabilities it declares, and declaring
# one that is not granted below stops the mod from loading
# Default: false
explicit = false

# Capabilities granted by the host. If not specified, all are granted:
# resource_inject, world_edit, block_register, entity_register,
# event_listen, mod_interact
# granted = ["resource_inject", "event_listen"]

[resolver]
# Load installed optional dependencies before the mods that use them
# Default: true
optional_ordering = true
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.game_version.trim().is_empty() {
            anyhow::bail!("host.game_version must not be empty");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.host.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.host.log_level,
                valid_log_levels.join(", ")
            );
        }

        for name in self.permissions.granted.iter().flatten() {
            if Capability::parse(name).is_none() {
                anyhow::bail!("Unknown capability in permissions.granted: {}", name);
            }
        }

        Ok(())
    }

    /// Get the mods directory
    ///
    /// Returns the configured directory or the default XDG data directory path
    pub fn mods_dir(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.host.mods_dir {
            return Ok(path.clone());
        }

        modweave_runtime::discovery::default_mods_dir()
            .context("Failed to determine project directories")
    }

    /// Build the permission policy described by this configuration
    pub fn permission_manager(&self) -> PermissionManager {
        let granted = match &self.permissions.granted {
            Some(names) => names.iter().filter_map(|n| Capability::parse(n)).collect(),
            None => CapabilitySet::all(),
        };

        let mut manager = PermissionManager::explicit(granted);
        manager.set_explicit(self.permissions.explicit);
        manager
    }

    pub fn resolver(&self) -> DependencyResolver {
        DependencyResolver::new().with_optional_ordering(self.resolver.optional_ordering)
    }
}
