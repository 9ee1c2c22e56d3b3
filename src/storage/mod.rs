//! Persistent Storage
//!
//! Sled-backed persistence for analysis results and binary artifacts.
//! Results are write-once keyed by content hash (the idempotency invariant
//! lives here, enforced with a compare-and-swap insert); artifacts carry a
//! retention deadline and are swept by a background prune task.

mod blobs;
mod results;

pub use blobs::{BlobStore, SledBlobStore, StoredBlob};
pub use results::{InsertOutcome, ResultStore, SledResultStore};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Open (or create) the service database at the given directory.
pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Arc<sled::Db>> {
    let path_ref = path.as_ref();
    let db = sled::open(path_ref).context("Failed to open sled database")?;
    tracing::info!("Storage opened at {:?}", path_ref);
    Ok(Arc::new(db))
}
