//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Only snapshot I/O can
//! fail; entry table operations never return errors.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Reading, writing, or renaming the snapshot file failed
    #[error("Snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file exists but its content could not be decoded
    #[error("Snapshot at {path} could not be decoded: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot document could not be encoded
    #[error("Snapshot could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    /// A relative snapshot path could not be resolved
    #[error("Could not resolve working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
