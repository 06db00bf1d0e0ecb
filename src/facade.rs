//! Cache Facade
//!
//! Public cache surface. Composes the entry table with an optional snapshot
//! store and, in persisted mode, rewrites the full snapshot after every
//! mutation before the call returns.
//!
//! Every mutation costs a serialization of the whole table, so this suits
//! small tables. There is no incremental persistence.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::{current_timestamp_ms, remaining_until, CacheStats, EntryTable, SkippedEntry};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::snapshot::{Snapshot, SnapshotStore};

/// Callback invoked for each live value left out of a snapshot because it
/// could not be encoded.
pub type UnserializableHook = Arc<dyn Fn(&SkippedEntry) + Send + Sync>;

// == Cache ==
/// Key/value cache with per-entry TTL and optional JSON snapshot file.
///
/// The mode (memory-only or persisted) is fixed at construction.
pub struct Cache<V> {
    table: EntryTable<V>,
    store: Option<SnapshotStore>,
    /// Serializes snapshot writes so each one exports the table it writes.
    write_lock: Mutex<()>,
    on_unserializable: Option<UnserializableHook>,
}

impl<V> Cache<V> {
    // == Constructors ==
    /// Creates a memory-only cache.
    pub fn in_memory() -> Self {
        Self {
            table: EntryTable::new(),
            store: None,
            write_lock: Mutex::new(()),
            on_unserializable: None,
        }
    }

    /// Registers a callback for values that cannot be written to the
    /// snapshot. They are logged at warn level either way.
    pub fn with_unserializable_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SkippedEntry) + Send + Sync + 'static,
    {
        self.on_unserializable = Some(Arc::new(hook));
        self
    }

    /// True when mutations are mirrored to a snapshot file.
    pub fn is_persisted(&self) -> bool {
        self.store.is_some()
    }

    /// Absolute snapshot location in persisted mode.
    pub fn persist_path(&self) -> Option<&Path> {
        self.store.as_ref().map(SnapshotStore::path)
    }

    /// Returns true if `key` holds a live entry. Never touches disk.
    pub fn has(&self, key: &str) -> bool {
        self.table.has(key)
    }

    /// Number of stored entries, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Remaining lifetime of a live entry with a TTL.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        self.table.ttl_remaining(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.table.stats()
    }

    // == Clear ==
    /// Empties the cache and, in persisted mode, writes an empty snapshot.
    pub async fn clear(&self) -> Result<()> {
        self.table.clear();

        if let Some(store) = &self.store {
            let _guard = self.write_lock.lock().await;
            store.save(&Snapshot::new()).await?;
        }
        Ok(())
    }

    fn report_skipped(&self, skipped: &[SkippedEntry]) {
        for entry in skipped {
            warn!(
                key = %entry.key,
                error = %entry.error,
                "Value cannot be encoded as JSON and stays memory-only"
            );
            if let Some(hook) = &self.on_unserializable {
                hook(entry);
            }
        }
    }
}

impl<V: Clone> Cache<V> {
    // == Get ==
    /// Returns the value for `key`, or None if it is missing or expired.
    /// Never touches disk.
    pub fn get(&self, key: &str) -> Option<V> {
        self.table.get(key)
    }
}

impl<V> Cache<V>
where
    V: DeserializeOwned + Send + 'static,
{
    // == Open ==
    /// Builds a cache from `config`.
    ///
    /// In persisted mode the existing snapshot is loaded first. Entries that
    /// already expired are dropped; the rest are re-inserted with their
    /// remaining TTL, not the original one.
    pub async fn open(config: Config) -> Result<Self> {
        let Some(path) = config.persist else {
            return Ok(Self::in_memory());
        };

        let mut cache = Self::in_memory();
        cache.store = Some(SnapshotStore::new(path)?);
        cache.rehydrate().await?;
        Ok(cache)
    }

    async fn rehydrate(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let snapshot = store.load().await?;
        let now = current_timestamp_ms();
        let mut restored = 0usize;
        let mut dropped = 0usize;

        for (key, entry) in snapshot {
            let ttl = match entry.expires_at {
                None => None,
                Some(expires_at) => match remaining_until(expires_at, now) {
                    Some(remaining) => Some(remaining),
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
            };

            let value = serde_json::from_value(entry.value).map_err(|source| {
                CacheError::Decode {
                    path: store.path().to_path_buf(),
                    source,
                }
            })?;
            self.table.set(key, value, ttl);
            restored += 1;
        }

        info!(
            path = %store.path().display(),
            restored,
            dropped,
            "Cache rehydrated from snapshot"
        );
        Ok(())
    }
}

impl<V> Cache<V>
where
    V: Serialize + Send + 'static,
{
    // == Set ==
    /// Inserts or overwrites `key`, then persists the full table.
    ///
    /// `ttl` of None (or zero) means the entry never expires. A value that
    /// cannot be encoded is kept in memory and left out of the snapshot.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> Result<()> {
        self.table.set(key, value, ttl);
        self.persist().await
    }

    // == Delete ==
    /// Removes `key`, then persists the full table. Absent keys are fine.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.table.delete(key);
        self.persist().await
    }

    // == Flush ==
    /// Rewrites the snapshot from the current table. A no-op in memory-only
    /// mode.
    pub async fn flush(&self) -> Result<()> {
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let export = self.table.export();
        self.report_skipped(&export.skipped);
        store.save(&export.snapshot).await
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("table", &self.table)
            .field("persist", &self.persist_path())
            .finish()
    }
}
