//! Runtime settings
//!
//! Reads settings from `config.toml`. A missing file yields defaults;
//! an unreadable or malformed file is an error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defaults::{DEFAULT_CONFIG_PATH, DEFAULT_SYSROOT, ENV_CONFIG_PATH};
use crate::error::ConfigError;

/// Settings for treedeploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// System root containing `ostree/`
    #[serde(default = "default_sysroot")]
    pub sysroot: PathBuf,

    /// Default osname for operations that need one
    #[serde(default)]
    pub osname: Option<String>,

    /// Cleanup behavior
    #[serde(default)]
    pub cleanup: CleanupSettings,

    /// Output preferences
    #[serde(default)]
    pub output: OutputSettings,
}

/// Cleanup behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Remove a leftover checkout directory at the end of cleanup
    #[serde(default = "default_true")]
    pub remove_tmp_rootfs: bool,
}

/// Output preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Emit JSON instead of text
    pub json: Option<bool>,

    /// Suppress informational output
    pub quiet: Option<bool>,
}

fn default_sysroot() -> PathBuf {
    PathBuf::from(DEFAULT_SYSROOT)
}

fn default_true() -> bool {
    true
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            remove_tmp_rootfs: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sysroot: default_sysroot(),
            osname: None,
            cleanup: CleanupSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Settings {
    /// Path of the settings file: `TREEDEPLOY_CONFIG` or the system default
    pub fn default_path() -> PathBuf {
        std::env::var_os(ENV_CONFIG_PATH)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
