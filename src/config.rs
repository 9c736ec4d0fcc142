//! Configuration file management
//!
//! A small JSON file under the OS configuration directory carries the
//! persistent defaults: retry count, timeouts, and an optional default
//! download directory. Every key is optional and unknown keys are
//! ignored, so the file survives hand edits and older versions. The
//! merge precedence is CLI value > file value > built-in default.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::paths::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT_SECS};
use crate::errors::{ConfigError, ConfigResult};

/// OS-appropriate configuration directory.
///
/// Windows: `%APPDATA%/DownloadManager`; otherwise
/// `$HOME/.config/DownloadManager`; the current directory when neither
/// variable is available.
pub fn config_dir() -> PathBuf {
    if cfg!(windows) {
        if let Some(appdata) = env::var_os("APPDATA") {
            return PathBuf::from(appdata).join(CONFIG_DIR_NAME);
        }
    } else if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME);
    }
    PathBuf::from(".")
}

/// Persistent configuration; every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub retry_count: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    pub default_download_dir: Option<String>,
}

impl FileConfig {
    /// Built-in defaults, as written on first run
    pub fn with_defaults() -> Self {
        Self {
            retry_count: Some(DEFAULT_RETRY_COUNT),
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECS),
            connect_timeout_seconds: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            default_download_dir: None,
        }
    }

    /// Load from `dir/config.json`.
    ///
    /// A missing file yields the empty config; a malformed file logs a
    /// warning and yields the empty config rather than failing the run.
    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE_NAME);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(error) => {
                warn!("could not read config file {}: {}", path.display(), error);
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => {
                debug!("loaded config from {}", path.display());
                config
            }
            Err(error) => {
                warn!(
                    "error parsing config file {}: {}; using default configuration",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    /// Load from the OS configuration directory
    pub fn load() -> Self {
        Self::load_from(&config_dir())
    }

    /// Write to `dir/config.json`, creating the directory tree as needed
    pub fn save_to(&self, dir: &Path) -> ConfigResult<()> {
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let rendered = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, rendered).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        debug!("saved config to {}", path.display());
        Ok(())
    }

    /// Write a default config file on first run; existing files are kept
    pub fn ensure_exists(dir: &Path) {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return;
        }
        match Self::with_defaults().save_to(dir) {
            Ok(()) => info!("created default config file at {}", path.display()),
            Err(error) => warn!("could not create default config file: {}", error),
        }
    }

    /// Effective retry count after merging with a CLI override
    pub fn effective_retry_count(&self, cli: Option<u32>) -> u32 {
        cli.or(self.retry_count).unwrap_or(DEFAULT_RETRY_COUNT)
    }

    /// Effective overall timeout (seconds) after merging with a CLI override
    pub fn effective_timeout_seconds(&self, cli: Option<u64>) -> u64 {
        cli.or(self.timeout_seconds).unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Effective connect timeout (seconds) after merging with a CLI override
    pub fn effective_connect_timeout_seconds(&self, cli: Option<u64>) -> u64 {
        cli.or(self.connect_timeout_seconds)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS)
    }
}
