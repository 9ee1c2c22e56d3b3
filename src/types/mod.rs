//! Core data model for the scan analysis pipeline

mod condition;
mod report;
mod scan;
mod severity;

pub use condition::{ConditionScore, ConditionSet};
pub use report::{AnalysisResult, HeatmapArtifact, StructuredReport, TriageOutcome};
pub use scan::{ContentHash, ImageEncoding, Modality, ScanRequest, ValidatedImage};
pub use severity::SeverityLevel;
