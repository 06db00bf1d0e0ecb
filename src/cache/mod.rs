//! Cache Module
//!
//! The in-memory entry table with TTL expiry.

mod entry;
mod stats;
mod table;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use stats::CacheStats;
pub use table::{EntryTable, Export, SkippedEntry};

pub(crate) use entry::remaining_until;
pub(crate) use table::{TableState, TimerCheck};
