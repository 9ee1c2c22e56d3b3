//! Write-once result store keyed by content hash
//!
//! The primary tree maps content hash to the serialized result; a secondary
//! tree maps scan id to content hash so replayed uploads stay retrievable
//! under every scan id that ever referenced them. The insert path uses
//! compare-and-swap so that when two identical uploads race, exactly one
//! result is written and both callers observe the same winner.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::{AnalysisResult, ContentHash};

/// Outcome of a write-once insert attempt.
#[derive(Debug)]
pub enum InsertOutcome {
    /// This result was written; the caller's result is canonical.
    Inserted,
    /// A result for this content hash already existed; the stored value is
    /// returned and the caller's computed result must be discarded.
    Existing(Box<AnalysisResult>),
}

/// Pluggable result persistence.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
pub trait ResultStore: Send + Sync {
    /// Insert a result unless one already exists for its content hash.
    ///
    /// Linearizable: concurrent inserts for the same hash resolve to exactly
    /// one `Inserted` and `Existing` for everyone else.
    fn insert_if_absent(&self, result: &AnalysisResult) -> Result<InsertOutcome, StorageError>;

    /// Look up the result for a content hash.
    fn lookup(&self, hash: &ContentHash) -> Result<Option<AnalysisResult>, StorageError>;

    /// Look up a result via any scan id that referenced it.
    fn lookup_by_scan_id(&self, scan_id: Uuid) -> Result<Option<AnalysisResult>, StorageError>;

    /// Number of stored results.
    fn count(&self) -> usize;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Sled-backed result store.
#[derive(Clone)]
pub struct SledResultStore {
    results: sled::Tree,
    scan_index: sled::Tree,
}

impl SledResultStore {
    pub fn open(db: &Arc<sled::Db>) -> Result<Self, StorageError> {
        Ok(Self {
            results: db.open_tree("results")?,
            scan_index: db.open_tree("scan_index")?,
        })
    }

    fn index_scan(&self, scan_id: Uuid, hash: &ContentHash) -> Result<(), StorageError> {
        self.scan_index
            .insert(scan_id.as_bytes(), hash.as_str().as_bytes())?;
        Ok(())
    }
}

impl ResultStore for SledResultStore {
    fn insert_if_absent(&self, result: &AnalysisResult) -> Result<InsertOutcome, StorageError> {
        let key = result.content_hash.as_str().as_bytes();
        let value = serde_json::to_vec(result)?;

        match self
            .results
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
        {
            Ok(()) => {
                self.index_scan(result.scan_id, &result.content_hash)?;
                self.results.flush()?;
                debug!(
                    scan_id = %result.scan_id,
                    content_hash = %result.content_hash,
                    "Result persisted"
                );
                Ok(InsertOutcome::Inserted)
            }
            Err(cas) => {
                // Lost the race; return the canonical stored result, but
                // still index this scan id against it.
                let current = cas.current.ok_or(StorageError::NotFound)?;
                let existing: AnalysisResult = serde_json::from_slice(&current)?;
                self.index_scan(result.scan_id, &result.content_hash)?;
                self.scan_index.flush()?;
                Ok(InsertOutcome::Existing(Box::new(existing)))
            }
        }
    }

    fn lookup(&self, hash: &ContentHash) -> Result<Option<AnalysisResult>, StorageError> {
        match self.results.get(hash.as_str().as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn lookup_by_scan_id(&self, scan_id: Uuid) -> Result<Option<AnalysisResult>, StorageError> {
        let Some(hash_bytes) = self.scan_index.get(scan_id.as_bytes())? else {
            return Ok(None);
        };
        match self.results.get(&hash_bytes)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> usize {
        self.results.len()
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
