//! Configuration management for wasp.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{Result, WaspError};
use crate::query::{Field, HighlightSpec};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure for wasp.
///
/// ## Example Configuration File (wasp.toml)
///
/// ```toml
/// [archive]
/// directory = "/home/me/.wasp/archives"
/// read_existing_records = true
/// poll_interval_ms = 1000
///
/// [index]
/// snapshot_interval_secs = 30
/// compress = true
///
/// [search]
/// page_size = 10
/// fragment_size = 100
/// max_fragments = 5
///
/// [general]
/// log_level = "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where archives are read from
    pub archive: ArchiveConfig,

    /// Document store and snapshots
    pub index: IndexConfig,

    /// Result paging and snippets
    pub search: SearchConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Archive directory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory the archiving proxy writes to (None = must be given on
    /// the command line)
    pub directory: Option<PathBuf>,

    /// Index the records already present in the directory on startup
    pub read_existing_records: bool,

    /// How long a tailing reader sleeps at end of data
    pub poll_interval_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            directory: None,
            read_existing_records: true,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Snapshot location (None = default location)
    pub data_dir: Option<PathBuf>,

    /// Seconds between snapshots while indexing
    pub snapshot_interval_secs: u64,

    /// Use compression for snapshots
    pub compress: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            data_dir: None,
            snapshot_interval_secs: 30,
            compress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results per page
    pub page_size: usize,

    /// Approximate snippet fragment length in bytes
    pub fragment_size: usize,

    /// Maximum number of fragments per snippet
    pub max_fragments: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            page_size: 10,
            fragment_size: 100,
            max_fragments: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| WaspError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| WaspError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.search.page_size == 0 {
            return Err(WaspError::ConfigError {
                reason: "search.page_size must be at least 1".to_string(),
            });
        }
        if self.archive.poll_interval_ms == 0 {
            return Err(WaspError::ConfigError {
                reason: "archive.poll_interval_ms must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "wasp").ok_or_else(|| WaspError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("wasp.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "wasp").ok_or_else(|| WaspError::ConfigError {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the snapshot directory (from config or default).
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.index.data_dir {
            Some(ref path) => Ok(path.clone()),
            None => Self::default_data_dir(),
        }
    }

    /// The archive directory, preferring `overridden` (the command line).
    pub fn archive_directory(&self, overridden: Option<&Path>) -> Result<PathBuf> {
        overridden
            .map(Path::to_path_buf)
            .or_else(|| self.archive.directory.clone())
            .ok_or_else(|| WaspError::ConfigError {
                reason: "no archive directory configured (set archive.directory or pass --directory)"
                    .to_string(),
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.archive.poll_interval_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.index.snapshot_interval_secs.max(1))
    }

    /// Snippet settings for the results fetcher.
    pub fn highlight(&self) -> HighlightSpec {
        HighlightSpec::new(Field::Content)
            .with_fragment_size(self.search.fragment_size)
            .with_max_fragments(self.search.max_fragments)
    }
}
