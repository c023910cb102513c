//! vexil-store
//!
//! Local persistence for probability clouds. Records are keyed under a
//! fixed `cloud_` prefix so cloud state can share a sled tree with
//! unrelated cached data, and every record carries the reconciliation flag
//! set when the local ring was last checked against the chain.
//!
//! The store is an injected collaborator with an explicit lifecycle: open
//! it once at process start, pass it where it is needed, and let drop (or
//! [`CloudStore::flush`]) close it. Tests use [`CloudStore::in_memory`].

use std::path::Path;

use sled::Db;
use thiserror::Error;
use tracing::{debug, warn};

use vexil_cloud::CloudRecord;

/// Namespace prefix separating cloud records from anything else sharing
/// the same database.
const KEY_PREFIX: &str = "cloud_";

/// Store-level errors. A single corrupt record is not one of them: corrupt
/// entries are skipped (and logged) so one bad row never hides the rest.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    /// A record could not be serialized for writing.
    #[error("record encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The requested record exists but cannot be decoded.
    #[error("record for cloud {cloud_id} is corrupt: {reason}")]
    Corrupt { cloud_id: u64, reason: String },
}

/// Sled-backed cloud cache.
pub struct CloudStore {
    db: Db,
}

impl CloudStore {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened cloud store");
        Ok(Self { db })
    }

    /// Open a throwaway in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn key(cloud_id: u64) -> String {
        format!("{KEY_PREFIX}{cloud_id}")
    }

    /// Write a record, replacing any previous version of the same cloud.
    ///
    /// Last-writer-wins at record granularity; the format has no
    /// sub-record concurrent fields.
    pub fn put(&self, record: &CloudRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.db.insert(Self::key(record.cloud_id), bytes)?;
        Ok(())
    }

    /// Fetch one record. `Ok(None)` when absent.
    pub fn get(&self, cloud_id: u64) -> Result<Option<CloudRecord>, StoreError> {
        match self.db.get(Self::key(cloud_id))? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    cloud_id,
                    reason: e.to_string(),
                }),
        }
    }

    /// List every readable record, newest cloud id first.
    ///
    /// Records that fail to deserialize are logged and skipped — one
    /// corrupt entry must not hide the others.
    pub fn list(&self) -> Result<Vec<CloudRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = entry?;
            match serde_json::from_slice::<CloudRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "skipping corrupt cloud record"
                    );
                }
            }
        }
        records.sort_by(|a, b| b.cloud_id.cmp(&a.cloud_id));
        Ok(records)
    }

    /// Delete one record. Returns whether it existed.
    pub fn delete(&self, cloud_id: u64) -> Result<bool, StoreError> {
        Ok(self.db.remove(Self::key(cloud_id))?.is_some())
    }

    /// Update the reconciliation flag in place.
    pub fn mark_verified(&self, cloud_id: u64, verified: bool) -> Result<(), StoreError> {
        if let Some(mut record) = self.get(cloud_id)? {
            record.verified = verified;
            self.put(&record)?;
        }
        Ok(())
    }

    /// Force pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for CloudStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStore").finish_non_exhaustive()
    }
}
