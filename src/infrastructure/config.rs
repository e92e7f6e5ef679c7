// src/infrastructure/config.rs
use crate::application::{EditorOptions, NavigationPolicy};
use crate::constants::{DEFAULT_QUIET_PERIOD_MS, MAX_IMAGE_BYTES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// TOML configuration for the client
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EditorConfig {
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// Write pending edits when switching notes instead of dropping them
    #[serde(default = "default_flush_on_navigate")]
    pub flush_on_navigate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ImageConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct StorageConfig {
    /// Database file; empty means the platform data directory
    #[serde(default)]
    pub database: String,
}

fn default_quiet_period_ms() -> u64 { DEFAULT_QUIET_PERIOD_MS }
fn default_flush_on_navigate() -> bool { true }
fn default_max_bytes() -> usize { MAX_IMAGE_BYTES }

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            flush_on_navigate: default_flush_on_navigate(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse TOML config")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path.as_ref(), toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Create default configuration file at path
    pub fn create_default(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Explicit path: load it, creating it with defaults if missing.
    /// No path: load the platform config file if present, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                debug!(path = %path.display(), "Config file missing, creating default");
                Self::create_default(path)
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        if !self.storage.database.is_empty() {
            return Ok(PathBuf::from(&self.storage.database));
        }
        let data_dir = dirs::data_dir().context("Could not find data directory")?;
        Ok(data_dir.join("notesync").join("notes.db"))
    }

    pub fn editor_options(&self) -> EditorOptions {
        EditorOptions {
            quiet_period: Duration::from_millis(self.editor.quiet_period_ms),
            navigation: if self.editor.flush_on_navigate {
                NavigationPolicy::Flush
            } else {
                NavigationPolicy::Discard
            },
            max_image_bytes: self.images.max_bytes,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("notesync").join("config.toml"))
}
