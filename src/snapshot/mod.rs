//! Snapshot Module
//!
//! The persisted form of the entry table and the file store that holds it.

mod format;
mod store;

pub use format::{Snapshot, SnapshotEntry};
pub use store::SnapshotStore;
