//! Artifact blob store with retention deadlines
//!
//! Holds heatmap overlays and FHIR documents under opaque string keys. Every
//! blob carries an expiry timestamp computed at write time; a background
//! sweep removes expired entries. Reads treat an expired-but-unswept blob as
//! absent so retention is enforced at the read path too.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StorageError;

/// One stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Pluggable artifact persistence.
pub trait BlobStore: Send + Sync {
    /// Store an artifact under a key, stamping its retention deadline.
    fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch an artifact. Expired blobs read as absent.
    fn get(&self, key: &str) -> Result<Option<StoredBlob>, StorageError>;

    /// Remove every blob past its retention deadline. Returns the count.
    fn prune_expired(&self) -> Result<usize, StorageError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Sled-backed blob store.
#[derive(Clone)]
pub struct SledBlobStore {
    tree: sled::Tree,
    ttl: Duration,
}

impl SledBlobStore {
    pub fn open(db: &Arc<sled::Db>, ttl_days: u64) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree("artifacts")?,
            // Capped well below chrono's overflow bound.
            ttl: Duration::days(i64::try_from(ttl_days.min(36_500)).unwrap_or(36_500)),
        })
    }
}

impl BlobStore for SledBlobStore {
    fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let now = Utc::now();
        let blob = StoredBlob {
            content_type: content_type.to_string(),
            bytes,
            stored_at: now,
            expires_at: now + self.ttl,
        };
        let value = serde_json::to_vec(&blob)?;
        self.tree.insert(key.as_bytes(), value)?;
        self.tree.flush()?;
        debug!(key, content_type, "Artifact stored");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>, StorageError> {
        let Some(value) = self.tree.get(key.as_bytes())? else {
            return Ok(None);
        };
        let blob: StoredBlob = serde_json::from_slice(&value)?;
        if blob.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(blob))
    }

    fn prune_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut keys_to_delete = Vec::new();

        for item in self.tree.iter() {
            let (key, value) = item?;
            match serde_json::from_slice::<StoredBlob>(&value) {
                Ok(blob) if blob.expires_at <= now => keys_to_delete.push(key.to_vec()),
                Ok(_) => {}
                // Undecodable entries are unrecoverable; sweep them too.
                Err(_) => keys_to_delete.push(key.to_vec()),
            }
        }

        let deleted = keys_to_delete.len();
        for key in keys_to_delete {
            self.tree.remove(key)?;
        }
        if deleted > 0 {
            self.tree.flush()?;
            info!(deleted, "Pruned expired artifacts");
        }

        Ok(deleted)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> Arc<sled::Db> {
        Arc::new(sled::Config::new().temporary(true).open().unwrap())
    }

    #[test]
    fn test_put_and_get() {
        let store = SledBlobStore::open(&temp_db(), 30).unwrap();
        store.put("heatmaps/abc.png", "image/png", vec![1, 2, 3]).unwrap();

        let blob = store.get("heatmaps/abc.png").unwrap().unwrap();
        assert_eq!(blob.content_type, "image/png");
        assert_eq!(blob.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = SledBlobStore::open(&temp_db(), 30).unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_zero_ttl_blob_reads_as_absent() {
        let store = SledBlobStore::open(&temp_db(), 0).unwrap();
        store.put("k", "image/png", vec![9]).unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_prune_removes_expired_only() {
        let db = temp_db();
        let expired = SledBlobStore::open(&db, 0).unwrap();
        let live = SledBlobStore::open(&db, 30).unwrap();

        expired.put("old", "image/png", vec![1]).unwrap();
        live.put("new", "image/png", vec![2]).unwrap();

        let deleted = live.prune_expired().unwrap();
        assert_eq!(deleted, 1);
        assert!(live.get("new").unwrap().is_some());
    }
}
