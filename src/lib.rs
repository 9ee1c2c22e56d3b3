//! MediScan: Scan Analysis Pipeline
//!
//! Accepts radiological images over HTTP and returns structured diagnostic
//! reports with severity triage and explainability overlays.
//!
//! ## Architecture
//!
//! - **Intake Validator**: cheap rejection of malformed uploads
//! - **Classifier Capability**: pluggable inference backend behind a trait
//! - **Severity Triage Engine**: pure, configured policy evaluation
//! - **Explainability Renderer**: best-effort heatmap overlays
//! - **Report Assembler**: deterministic structured reports + FHIR export
//! - **Pipeline Orchestrator**: admission control, state machine, recovery
//! - **Storage**: write-once results and TTL-bound artifacts on sled

pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod explain;
pub mod intake;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod triage;
pub mod types;

// Re-export the pipeline surface
pub use pipeline::{Orchestrator, PipelineStats};

// Re-export commonly used types
pub use types::{
    AnalysisResult, ConditionScore, ConditionSet, ContentHash, Modality, ScanRequest,
    SeverityLevel, StructuredReport, TriageOutcome,
};

// Re-export errors
pub use error::{InferenceError, PipelineError, RenderingError, StorageError, ValidationError};
