//! Built-in defaults used when no config file is present.
//!
//! Every value here is overridable via `mediscan.toml`; these exist so a
//! bare checkout serves sensible behavior for chest X-ray triage.

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Maximum accepted upload size (10 MB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Minimum accepted pixel dimension (either axis).
pub const MIN_DIMENSION_PX: u32 = 64;

/// Maximum accepted pixel dimension (either axis).
pub const MAX_DIMENSION_PX: u32 = 4096;

/// Concurrent analysis tasks (classification is the scarce resource).
pub const WORKER_POOL_SIZE: usize = 4;

/// Requests allowed to wait for a worker before capacity is signalled.
pub const QUEUE_DEPTH: usize = 8;

/// Classifier invocation timeout. On expiry the call is retried exactly
/// once; a second expiry fails the request.
pub const CLASSIFY_TIMEOUT_MS: u64 = 30_000;

/// Explainability rendering timeout. Not retried; expiry degrades the
/// result instead of failing it.
pub const RENDER_TIMEOUT_MS: u64 = 10_000;

/// Maximum asynchronous persistence retry attempts before the fault is
/// logged as permanent.
pub const PERSIST_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Base delay for persistence retry backoff (doubles per attempt).
pub const PERSIST_RETRY_BASE_MS: u64 = 200;

/// Artifact retention before the pruning task deletes blobs.
pub const ARTIFACT_TTL_DAYS: u64 = 30;

/// Interval between artifact pruning sweeps.
pub const PRUNE_INTERVAL_SECS: u64 = 3600;

/// Default data directory for the sled stores.
pub const DATA_DIR: &str = "./data";

/// Mandatory report disclaimer. Copied verbatim into every report; config
/// validation rejects an empty override.
pub const DISCLAIMER: &str = "DISCLAIMER: This AI-generated report is for educational and \
research purposes only and does not constitute medical advice or a clinical diagnosis. \
Always consult a qualified radiologist or physician.";
