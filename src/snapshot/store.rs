//! Snapshot Store
//!
//! Reads and writes the whole table as a single JSON file. Pure I/O adapter.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::Snapshot;
use crate::error::{CacheError, Result};

/// Durable storage for one snapshot at a fixed location.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store for `path`, resolving relative paths against the
    /// current working directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref()).map_err(CacheError::CurrentDir)?;
        Ok(Self { path })
    }

    /// Absolute location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Load ==
    /// Returns the persisted snapshot, or an empty one if no file exists yet.
    pub async fn load(&self) -> Result<Snapshot> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot on disk, starting empty");
                return Ok(Snapshot::new());
            }
            Err(err) => return Err(CacheError::io(&self.path, err)),
        };

        serde_json::from_str(&raw).map_err(|source| CacheError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    // == Save ==
    /// Replaces the snapshot file with `snapshot`.
    ///
    /// The document is written and synced to a sibling temporary file which
    /// is then renamed over the target, so readers see either the previous
    /// snapshot or the new one in full.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| CacheError::io(parent, err))?;
        }

        let encoded = serde_json::to_string_pretty(snapshot).map_err(CacheError::Encode)?;
        let tmp = self.temp_path();

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|err| CacheError::io(&tmp, err))?;
        file.write_all(encoded.as_bytes())
            .await
            .map_err(|err| CacheError::io(&tmp, err))?;
        file.sync_all()
            .await
            .map_err(|err| CacheError::io(&tmp, err))?;
        drop(file);

        if let Err(err) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(&self.path, err));
        }

        debug!(
            path = %self.path.display(),
            entries = snapshot.len(),
            "Snapshot written"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
