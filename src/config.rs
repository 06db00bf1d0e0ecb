//! Configuration Module
//!
//! Construction options for the cache, loadable from environment variables.

use std::env;
use std::path::PathBuf;

/// File name used when persistence is requested without an explicit path.
pub const DEFAULT_SNAPSHOT_FILE: &str = "cache.json";

/// Cache configuration parameters.
///
/// The persistence mode is fixed once a cache is built from this value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Snapshot file location. `None` keeps the cache memory-only.
    /// Relative paths are resolved against the working directory.
    pub persist: Option<PathBuf>,
}

impl Config {
    /// Memory-only configuration.
    pub fn memory_only() -> Self {
        Self { persist: None }
    }

    /// Persisted configuration writing snapshots to `path`.
    pub fn persisted(path: impl Into<PathBuf>) -> Self {
        Self {
            persist: Some(path.into()),
        }
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PERSIST` - unset keeps the cache memory-only, an empty value
    ///   persists to `cache.json`, anything else is the snapshot path
    pub fn from_env() -> Self {
        Self {
            persist: env::var_os("CACHE_PERSIST").map(|raw| {
                if raw.is_empty() {
                    PathBuf::from(DEFAULT_SNAPSHOT_FILE)
                } else {
                    PathBuf::from(raw)
                }
            }),
        }
    }
}
