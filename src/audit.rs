//! Audit trail
//!
//! Every scan's lifecycle is recorded as structured events under the
//! dedicated `audit` tracing target, so deployments can route the trail to
//! its own sink separately from operational logs. Events carry identifiers
//! and metadata only, never image content.

use crate::types::{AnalysisResult, ScanRequest};

/// Target name for audit events; subscribers filter on this.
pub const AUDIT_TARGET: &str = "audit";

pub fn scan_received(request: &ScanRequest) {
    tracing::info!(
        target: "audit",
        event = "scan_received",
        scan_id = %request.scan_id,
        content_hash = %request.content_hash,
        requester = %request.requester,
        modality = ?request.modality,
        bytes = request.image_bytes.len(),
    );
}

pub fn scan_completed(result: &AnalysisResult) {
    tracing::info!(
        target: "audit",
        event = "scan_completed",
        scan_id = %result.scan_id,
        content_hash = %result.content_hash,
        severity = %result.severity,
        degraded = result.is_degraded(),
    );
}

pub fn scan_replayed(request: &ScanRequest, existing: &AnalysisResult) {
    tracing::info!(
        target: "audit",
        event = "scan_replayed",
        scan_id = %request.scan_id,
        canonical_scan_id = %existing.scan_id,
        content_hash = %request.content_hash,
        requester = %request.requester,
    );
}

pub fn scan_rejected(request: &ScanRequest) {
    tracing::warn!(
        target: "audit",
        event = "scan_rejected",
        scan_id = %request.scan_id,
        requester = %request.requester,
        reason = "capacity",
    );
}

pub fn scan_failed(request: &ScanRequest, reason: &str) {
    tracing::warn!(
        target: "audit",
        event = "scan_failed",
        scan_id = %request.scan_id,
        content_hash = %request.content_hash,
        requester = %request.requester,
        reason,
    );
}

pub fn report_accessed(scan_id: uuid::Uuid, requester: &str) {
    tracing::info!(
        target: "audit",
        event = "report_accessed",
        %scan_id,
        requester,
    );
}

pub fn artifact_accessed(key: &str, requester: &str) {
    tracing::info!(
        target: "audit",
        event = "artifact_accessed",
        key,
        requester,
    );
}
