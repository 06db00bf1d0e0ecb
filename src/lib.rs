//! Snapcache - an in-process key-value cache
//!
//! Per-entry TTL expiry with optional durable snapshotting of the whole
//! table to a single JSON file.

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod snapshot;
mod tasks;

pub use cache::{CacheStats, EntryTable, Export, SkippedEntry};
pub use config::Config;
pub use error::{CacheError, Result};
pub use facade::{Cache, UnserializableHook};
pub use snapshot::{Snapshot, SnapshotEntry, SnapshotStore};
