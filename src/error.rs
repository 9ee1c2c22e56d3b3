//! Pipeline failure taxonomy
//!
//! Each variant class has a distinct recovery policy:
//! - `ValidationError`: surfaced to the caller as a rejection, never retried
//! - `InferenceError`: timeout is retried exactly once internally, then
//!   surfaced as service-unavailable, never a guessed result
//! - `RenderingError`: recovered locally, degrades the result (no heatmap)
//! - `StorageError`: recovered via asynchronous capped-backoff retry, never
//!   blocks a response once the result is computed
//! - `CapacityExceeded`: backpressure signal when the worker pool and its
//!   bounded queue are both full

use crate::types::Modality;

/// Intake validation failures. No partial validation state is retained.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("payload of {actual} bytes exceeds the configured maximum of {max} bytes")]
    TooLarge { actual: usize, max: usize },
    #[error("unsupported image format (accepted: JPEG, PNG)")]
    UnsupportedFormat,
    #[error("payload is empty or not decodable as a valid image")]
    Corrupt,
    #[error("image dimensions {width}x{height} outside configured range {min}..={max} px")]
    DimensionOutOfRange {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },
}

/// Classifier capability failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InferenceError {
    #[error("classifier did not respond within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("classifier backend error: {0}")]
    Backend(String),
}

/// Explainability renderer failures. Always non-fatal to the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderingError {
    #[error("classifier retained no activations for this scan")]
    MissingActivations,
    #[error("explainability is not supported for {0:?}")]
    UnsupportedModality(Modality),
    #[error("renderer did not complete within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Persistence failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found")]
    NotFound,
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Terminal failure of one pipeline run, as exposed to the caller.
///
/// Rendering and storage faults never appear here; they are recovered
/// inside the orchestrator per the degradation rules above.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("worker pool and admission queue are full")]
    CapacityExceeded,
    #[error("internal pipeline fault: {0}")]
    Internal(String),
}
