//! TOML configuration for the LanDrop application.
//!
//! Everything lives in one data directory:
//!
//! - Windows: `%APPDATA%\LanDrop\`
//! - Linux:   `$XDG_CONFIG_HOME/landrop/` (or `~/.config/landrop/`)
//! - macOS:   `~/Library/Application Support/LanDrop/`
//!
//! The `LANDROP_DATA_DIR` environment variable overrides the platform
//! directory, which is how two instances run side by side on one machine:
//!
//! ```bash
//! # Terminal 1
//! LANDROP_DATA_DIR=/tmp/drop1 landrop
//! # Terminal 2
//! LANDROP_DATA_DIR=/tmp/drop2 landrop
//! ```
//!
//! A missing config file yields defaults; fields absent from the file fall
//! back individually via serde defaults.

use std::path::{Path, PathBuf};

use landrop_net::NetworkConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the config file inside the data directory.
const CONFIG_FILE: &str = "config.toml";

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform data directory could not be determined.
    #[error("could not determine a data directory; set LANDROP_DATA_DIR")]
    NoDataDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            network: NetworkConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolves the data directory: `LANDROP_DATA_DIR` wins, then the platform
/// config location.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("LANDROP_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    platform_data_dir().ok_or(ConfigError::NoDataDir)
}

/// Loads the configuration from `dir`, returning defaults when the file
/// does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found" and [`ConfigError::Parse`] when the TOML is malformed.
pub fn load_config(dir: &Path) -> Result<AppConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` under `dir`, creating the directory if needed.
pub fn save_config(dir: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(CONFIG_FILE);
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })
}

fn platform_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanDrop"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("landrop"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanDrop")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
