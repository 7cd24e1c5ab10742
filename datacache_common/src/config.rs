//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the daemon's TOML
//! configuration file, mirroring the `ConfigLoader` trait pattern used
//! across the workspace: a blanket impl over `DeserializeOwned`, backed by
//! `toml::from_str`, with defaults filled in via `#[serde(default = ...)]`
//! so an empty file still produces a runnable configuration.
//!
//! # Usage
//!
//! ```rust,no_run
//! use datacache_common::config::{ConfigLoader, DaemonConfig};
//! use std::path::Path;
//!
//! let config = DaemonConfig::load(Path::new("datacache.toml")).expect("load config");
//! println!("cache capacity: {} bytes", config.cache_capacity_bytes());
//! ```

use crate::consts::{
    DEFAULT_CACHE_SIZE_GIB, DEFAULT_DATASET_EXTENSION, DEFAULT_LOCK_FILE,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_PORT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Log level for configuration.
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level verbosity.
    Trace,
    /// Debug-level verbosity.
    Debug,
    /// Info-level verbosity (default).
    Info,
    /// Warning-level verbosity.
    Warn,
    /// Error-level verbosity.
    Error,
}

impl LogLevel {
    /// Render as the `env-filter` directive string `tracing_subscriber` expects.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
    },

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist.
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_cache_size_gib() -> u64 {
    DEFAULT_CACHE_SIZE_GIB
}

fn default_data_path() -> PathBuf {
    let user = std::env::var("USER").unwrap_or_else(|_| "datacache".to_string());
    PathBuf::from(format!("/home/{user}/converted_parquet"))
}

fn default_dataset_extension() -> String {
    DEFAULT_DATASET_EXTENSION.to_string()
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    DEFAULT_PORT
}

fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

fn default_lock_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_FILE)
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Top-level daemon configuration — loaded from `datacache.toml`.
///
/// Every field has a sensible default, so `DaemonConfig::default()` (or
/// loading an empty file) produces a configuration that can start the
/// daemon against `/home/<user>/converted_parquet` on `127.0.0.1:6000`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Cache capacity in GiB; interpreted as `value * 2^30` bytes.
    #[serde(default = "default_cache_size_gib")]
    pub cache_size: u64,

    /// Directory holding dataset files.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Extension used to resolve `<data_path>/<id>.<ext>` — configurable
    /// (see DESIGN.md).
    #[serde(default = "default_dataset_extension")]
    pub dataset_extension: String,

    /// TCP listen host.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// TCP listen port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Bounded worker pool size for the request server (default CPU count × 2).
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Path to the single-instance advisory lock file.
    #[serde(default = "default_lock_file_path")]
    pub lock_file_path: PathBuf,

    /// Documented client polling timeout in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Documented client poll interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Log level for `tracing`.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size_gib(),
            data_path: default_data_path(),
            dataset_extension: default_dataset_extension(),
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            worker_pool_size: default_worker_pool_size(),
            lock_file_path: default_lock_file_path(),
            poll_timeout_secs: default_poll_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            log_level: LogLevel::default(),
        }
    }
}

impl DaemonConfig {
    /// Cache capacity in bytes (`cache_size * 2^30`).
    pub fn cache_capacity_bytes(&self) -> u64 {
        self.cache_size * (1u64 << 30)
    }

    /// Resolve the on-disk path for a dataset identifier.
    pub fn dataset_path(&self, id: &str) -> PathBuf {
        self.data_path.join(format!("{id}.{}", self.dataset_extension))
    }

    /// Socket address to bind the request server to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::ValidationError(
                "cache_size must be greater than 0".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "worker_pool_size must be greater than 0".to_string(),
            ));
        }
        if self.dataset_extension.is_empty() {
            return Err(ConfigError::ValidationError(
                "dataset_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_capacity_bytes(), 20 * (1u64 << 30));
    }

    #[test]
    fn dataset_path_uses_configured_extension() {
        let mut config = DaemonConfig::default();
        config.data_path = PathBuf::from("/data");
        config.dataset_extension = "parquet".to_string();
        assert_eq!(
            config.dataset_path("2024-01-01_trades"),
            PathBuf::from("/data/2024-01-01_trades.parquet")
        );
    }

    #[test]
    fn empty_toml_loads_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE_GIB);
        assert_eq!(config.listen_port, DEFAULT_PORT);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml_str = r#"
            cache_size = 5
            data_path = "/mnt/datasets"
        "#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache_size, 5);
        assert_eq!(config.data_path, PathBuf::from("/mnt/datasets"));
        assert_eq!(config.listen_port, DEFAULT_PORT);
    }

    #[test]
    fn rejects_zero_cache_size() {
        let mut config = DaemonConfig::default();
        config.cache_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let result = DaemonConfig::load(Path::new("/nonexistent/datacache.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
