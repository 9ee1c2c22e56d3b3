//! Classifier Capability - the black-box inference interface
//!
//! The pipeline treats classification as an external capability with a
//! fixed contract: given a validated image, return per-condition confidence
//! scores and retain the internal activations the explainability renderer
//! needs. The capability is constructed once at startup and passed into the
//! orchestrator; initialization failure (e.g. a missing model artifact) is
//! fatal and the service refuses to start.

mod fixture;

pub use fixture::FixtureClassifier;

use async_trait::async_trait;

use crate::error::InferenceError;
use crate::types::ValidatedImage;

/// Spatial activation map retained by the classifier for explainability.
///
/// Row-major grid of values normalized into [0, 1]. The grid is typically
/// much coarser than the source image; the renderer upsamples it.
#[derive(Debug, Clone)]
pub struct ActivationGrid {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl ActivationGrid {
    /// Value at (x, y), clamped to the grid edge.
    pub fn at(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.values
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

/// One classifier invocation: raw label scores plus retained state.
///
/// Scores are raw backend output; alignment to the configured vocabulary
/// (zero-filling abstentions, dropping unknown labels) happens in the
/// orchestrator via [`crate::types::ConditionSet::from_raw`].
#[derive(Debug, Clone)]
pub struct Inference {
    pub scores: Vec<(String, f64)>,
    /// Retained activations; `None` when the backend cannot provide them
    /// (the renderer then degrades the result instead of failing it).
    pub activations: Option<ActivationGrid>,
}

/// The classification capability contract.
///
/// Implementations must be cheap to share (`Send + Sync`) across worker
/// tasks; the model itself is loaded once and immutable thereafter.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Classify a validated image into per-condition confidences.
    async fn classify(&self, image: &ValidatedImage) -> Result<Inference, InferenceError>;
}

/// Classifier initialization failures. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierInitError {
    #[error("model artifact not readable at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("model artifact malformed: {0}")]
    Malformed(String),
}
