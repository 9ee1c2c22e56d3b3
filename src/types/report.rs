//! Structured reports, heatmap artifacts, and the final analysis aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::{ConditionScore, ConditionSet};
use super::scan::{ContentHash, Modality};
use super::severity::SeverityLevel;

/// Explainability overlay produced by the renderer.
///
/// Created by the renderer, owned by the persistence dispatcher thereafter.
/// The payload is opaque to the pipeline; only the content type matters
/// when serving it back.
#[derive(Debug, Clone)]
pub struct HeatmapArtifact {
    pub scan_id: Uuid,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Four-section radiology report plus the mandatory disclaimer.
///
/// The disclaimer is a correctness invariant: it is copied verbatim from
/// configuration and must be non-empty in every instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub technique: String,
    pub findings: String,
    pub impression: String,
    pub recommendation: String,
    pub disclaimer: String,
}

/// Result of the severity triage engine: the level plus the ordered list of
/// conditions that drove it (descending confidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub severity: SeverityLevel,
    pub contributing: Vec<ConditionScore>,
}

/// Aggregate outcome of one scan analysis. Immutable once persisted; at most
/// one exists per content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub scan_id: Uuid,
    pub content_hash: ContentHash,
    pub modality: Modality,
    pub severity: SeverityLevel,
    pub conditions: ConditionSet,
    pub contributing: Vec<ConditionScore>,
    pub report: StructuredReport,
    /// Blob store key of the heatmap overlay, when rendering succeeded.
    pub heatmap_key: Option<String>,
    /// Blob store key of the FHIR DiagnosticReport document.
    pub fhir_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Whether this is a degraded result (complete except for the heatmap).
    pub fn is_degraded(&self) -> bool {
        self.heatmap_key.is_none()
    }
}
