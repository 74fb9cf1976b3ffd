//! Tunable limits for indexing, filtering, clustering, and row access.
//!
//! Every value has a default suited to multi-gigabyte logs. With the `config`
//! feature enabled, the same structure can be loaded from a TOML file whose
//! sections mirror the nested structs:
//!
//! ```toml
//! [index]
//! chunk_size = 8388608
//!
//! [cluster]
//! sample_bytes = 2048
//! ```

use std::time::Duration;

#[cfg(feature = "config")]
use crate::error::{LogsiftError, Result};
#[cfg(feature = "config")]
use serde::Deserialize;
#[cfg(feature = "config")]
use std::path::{Path, PathBuf};

/// Top-level configuration, one section per engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(default))]
pub struct Config {
    pub index: IndexConfig,
    pub filter: FilterConfig,
    pub cluster: ClusterConfig,
    pub rows: RowConfig,
}

/// Streaming indexer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(default))]
pub struct IndexConfig {
    /// Bytes read from disk per chunk
    pub chunk_size: usize,
    /// Bytes of each line kept for timestamp and level detection
    pub prefix_bytes: usize,
    /// Minimum time between two progress reports
    pub progress_interval_ms: u64,
}

impl IndexConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024 * 1024,
            prefix_bytes: 256,
            progress_interval_ms: 100,
        }
    }
}

/// Filter engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(default))]
pub struct FilterConfig {
    /// Maximum bytes of a line decoded for the text query
    pub line_limit: usize,
    /// Rows scanned between two progress reports
    pub progress_every: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            line_limit: 256 * 1024,
            progress_every: 20_000,
        }
    }
}

/// Cluster engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(default))]
pub struct ClusterConfig {
    /// Prefix inspected by the errors-only heuristic
    pub prefix_bytes: usize,
    /// Maximum bytes of a line used for the template key
    pub line_limit: usize,
    /// Maximum characters kept for a cluster's sample line
    pub sample_bytes: usize,
    /// Rows processed between two progress reports
    pub progress_every: u64,
    /// Cluster count used when the caller does not choose one
    pub default_max_clusters: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            prefix_bytes: 4096,
            line_limit: 64 * 1024,
            sample_bytes: 4096,
            progress_every: 5_000,
            default_max_clusters: 50,
        }
    }
}

/// Consumer-facing row access settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize), serde(default))]
pub struct RowConfig {
    /// Maximum bytes of a line split into row fields
    pub line_limit: usize,
    /// Maximum bytes returned for the raw detail text of a row
    pub raw_line_limit: usize,
    /// Number of decoded rows kept in the LRU cache
    pub cache_capacity: usize,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            line_limit: 256 * 1024,
            raw_line_limit: 1024 * 1024,
            cache_capacity: 4000,
        }
    }
}

#[cfg(feature = "config")]
impl Config {
    /// Parse a configuration from TOML text; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| LogsiftError::config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LogsiftError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// `<config dir>/logsift/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("logsift").join("config.toml"))
    }

    /// Load the default configuration file if it exists, otherwise use defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::debug!("loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}
