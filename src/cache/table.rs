//! Entry Table Module
//!
//! In-memory key/value table with per-entry TTL. Expired entries leave the
//! table two ways that agree on one predicate: a per-entry timer task, and
//! lazy reaping on every read path (`get`, `has`, `export`).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::entry::{current_timestamp_ms, effective_ttl, remaining_until};
use crate::cache::{CacheEntry, CacheStats};
use crate::snapshot::Snapshot;
use crate::tasks::spawn_expiry_timer;

// == Export ==
/// Result of exporting the table.
#[derive(Debug, Default)]
pub struct Export {
    /// Every live entry whose value encoded to JSON
    pub snapshot: Snapshot,
    /// Live entries left out of `snapshot` because their value failed to encode
    pub skipped: Vec<SkippedEntry>,
}

/// A live entry that could not be represented in the snapshot. It stays in
/// memory.
#[derive(Debug)]
pub struct SkippedEntry {
    pub key: String,
    pub error: serde_json::Error,
}

/// Outcome of an expiry timer waking up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerCheck {
    /// The entry expired and was removed
    Removed,
    /// The entry is still valid; sleep this long and check again
    Pending(Duration),
    /// The key was deleted or overwritten since the timer was armed
    Stale,
}

// == Table State ==
/// Lock-protected table contents, shared with the expiry timers.
pub(crate) struct TableState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    timers: HashMap<String, JoinHandle<()>>,
    next_generation: u64,
    stats: CacheStats,
}

impl<V> Default for TableState<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            timers: HashMap::new(),
            next_generation: 0,
            stats: CacheStats::new(),
        }
    }
}

impl<V> TableState<V> {
    /// Removes `key` if it still holds the entry version `generation` and
    /// that entry has expired as of `now_ms`.
    ///
    /// Called by the expiry timer, which may wake inside the final
    /// millisecond the entry is still valid.
    pub(crate) fn expire(&mut self, key: &str, generation: u64, now_ms: i64) -> TimerCheck {
        let expires_at = match self.entries.get(key) {
            Some(entry) if entry.generation == generation => entry.expires_at,
            _ => return TimerCheck::Stale,
        };
        let Some(expires_at) = expires_at else {
            return TimerCheck::Stale;
        };

        if expires_at >= now_ms {
            let wait = remaining_until(expires_at, now_ms).unwrap_or(Duration::from_millis(1));
            return TimerCheck::Pending(wait);
        }

        self.entries.remove(key);
        // The handle belongs to the running timer; dropping it just detaches.
        self.timers.remove(key);
        self.stats.record_expiration();
        TimerCheck::Removed
    }

    fn cancel_timer(&mut self, key: &str) {
        if let Some(handle) = self.timers.remove(key) {
            handle.abort();
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.cancel_timer(key);
        self.entries.remove(key)
    }

    fn reap(&mut self, key: &str) {
        if self.remove(key).is_some() {
            self.stats.record_expiration();
            debug!(key = %key, "Lazily reaped expired entry");
        }
    }

    /// Looks `key` up, reaping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&CacheEntry<V>> {
        let expired = self.entries.get(key)?.is_expired_at(current_timestamp_ms());
        if expired {
            self.reap(key);
            return None;
        }
        self.entries.get(key)
    }

    fn reap_all_expired(&mut self, now_ms: i64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.reap(key);
        }
        expired.len()
    }
}

impl<V> Drop for TableState<V> {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

// == Entry Table ==
/// In-memory key/value table with per-entry TTL.
///
/// All operations are synchronous and infallible. Entries with a TTL get a
/// timer on the current tokio runtime that removes them without any read;
/// outside a runtime expiry is lazy only.
pub struct EntryTable<V> {
    state: Arc<Mutex<TableState<V>>>,
}

impl<V> EntryTable<V> {
    // == Constructor ==
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState::default())),
        }
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not yet
    /// reaped.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    // == Is Empty ==
    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    // == Stats ==
    /// Returns current table statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.total_entries = state.entries.len();
        stats
    }

    // == Time To Live ==
    /// Remaining lifetime of a live entry with a TTL.
    ///
    /// Returns None when the key is absent, expired, or never expires.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let state = self.state.lock();
        let entry = state.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry.ttl_remaining()
    }

    // == Get ==
    /// Returns true if `key` holds a live entry. An expired entry is removed.
    pub fn has(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let found = state.live(key).is_some();
        if found {
            state.stats.record_hit();
        } else {
            state.stats.record_miss();
        }
        found
    }

    // == Delete ==
    /// Removes `key` and cancels its timer. Deleting an absent key is a no-op.
    pub fn delete(&self, key: &str) {
        self.state.lock().remove(key);
    }

    // == Clear ==
    /// Cancels every timer and empties the table.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for (_, handle) in state.timers.drain() {
            handle.abort();
        }
        state.entries.clear();
    }
}

impl<V: Clone> EntryTable<V> {
    /// Returns the value for `key` if it is present and not expired. An
    /// expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock();
        let value = state.live(key).map(|entry| entry.value.clone());
        if value.is_some() {
            state.stats.record_hit();
        } else {
            state.stats.record_miss();
        }
        value
    }
}

impl<V: Send + 'static> EntryTable<V> {
    // == Set ==
    /// Inserts or overwrites `key`.
    ///
    /// Any timer armed for a previous value of `key` is cancelled first. A
    /// positive `ttl` arms a new one; `None` or a zero duration means the
    /// entry never expires.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = effective_ttl(ttl);

        let mut state = self.state.lock();
        state.cancel_timer(&key);

        state.next_generation += 1;
        let generation = state.next_generation;

        let mut entry = CacheEntry::new(value, ttl);
        entry.generation = generation;
        state.entries.insert(key.clone(), entry);

        if let Some(ttl) = ttl {
            let weak = Arc::downgrade(&self.state);
            if let Some(handle) = spawn_expiry_timer(weak, key.clone(), generation, ttl) {
                state.timers.insert(key, handle);
            }
        }
    }
}

impl<V: Serialize> EntryTable<V> {
    // == Export ==
    /// Snapshots every live entry, reaping expired ones first.
    ///
    /// Values that fail to encode are reported in [`Export::skipped`] and
    /// left out of the snapshot; they remain in the table.
    pub fn export(&self) -> Export {
        let mut state = self.state.lock();
        state.reap_all_expired(current_timestamp_ms());

        let mut export = Export::default();
        for (key, entry) in &state.entries {
            match serde_json::to_value(&entry.value) {
                Ok(value) => export.snapshot.insert(key.clone(), value, entry.expires_at),
                Err(error) => export.skipped.push(SkippedEntry {
                    key: key.clone(),
                    error,
                }),
            }
        }
        export
    }
}

impl<V> Default for EntryTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for EntryTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EntryTable")
            .field("entries", &state.entries.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}
