//! API request handlers

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use super::envelope::ApiErrorResponse;
use crate::error::{PipelineError, ValidationError};
use crate::pipeline::{Orchestrator, StatsSnapshot};
use crate::storage::{BlobStore, ResultStore};
use crate::types::{
    AnalysisResult, ConditionScore, Modality, ScanRequest, SeverityLevel, StructuredReport,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub results: Arc<dyn ResultStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub service_name: String,
    pub disclaimer: String,
    pub started_at: Instant,
}

/// Wire shape of one finished analysis.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub scan_id: Uuid,
    pub modality: Modality,
    pub severity: SeverityLevel,
    pub conditions: Vec<ConditionScore>,
    pub contributing: Vec<ConditionScore>,
    pub report: StructuredReport,
    pub heatmap_url: Option<String>,
    pub fhir_report_url: Option<String>,
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

impl From<AnalysisResult> for AnalysisResponse {
    fn from(result: AnalysisResult) -> Self {
        Self {
            scan_id: result.scan_id,
            modality: result.modality,
            severity: result.severity,
            conditions: result.conditions.scores().to_vec(),
            contributing: result.contributing.clone(),
            heatmap_url: result
                .heatmap_key
                .as_deref()
                .map(|k| format!("/api/v1/artifacts/{k}")),
            fhir_report_url: result
                .fhir_key
                .as_deref()
                .map(|k| format!("/api/v1/artifacts/{k}")),
            degraded: result.is_degraded(),
            report: result.report,
            generated_at: result.created_at,
        }
    }
}

/// Opaque requester token from the bearer credential, for the audit trail.
/// Requests without one are recorded as anonymous.
fn requester_of(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map_or_else(|| "anonymous".to_string(), str::to_string)
}

/// POST /api/v1/analyze: multipart upload, synchronous analysis.
pub async fn analyze(
    State(state): State<ApiState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let requester = requester_of(&headers);
    let mut image_bytes: Option<Vec<u8>> = None;
    let mut modality = Modality::default();

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name().map(str::to_string).as_deref() {
                Some("file") => match field.bytes().await {
                    Ok(bytes) => image_bytes = Some(bytes.to_vec()),
                    Err(e) => {
                        return ApiErrorResponse::build(
                            StatusCode::PAYLOAD_TOO_LARGE,
                            "PAYLOAD_TOO_LARGE",
                            format!("upload could not be read: {e}"),
                        );
                    }
                },
                Some("modality") => {
                    let declared = field.text().await.unwrap_or_default();
                    match Modality::parse(&declared) {
                        Some(m) => modality = m,
                        None => {
                            return ApiErrorResponse::build(
                                StatusCode::UNPROCESSABLE_ENTITY,
                                "UNKNOWN_MODALITY",
                                format!("unknown modality '{declared}'"),
                            );
                        }
                    }
                }
                _ => {}
            },
            Ok(None) => break,
            Err(e) => {
                return ApiErrorResponse::bad_request(format!("malformed multipart body: {e}"));
            }
        }
    }

    let Some(bytes) = image_bytes else {
        return ApiErrorResponse::bad_request("missing 'file' field in multipart body");
    };

    let request = ScanRequest::new(bytes, requester, modality);
    match state.orchestrator.analyze(request).await {
        Ok(result) => (StatusCode::OK, Json(AnalysisResponse::from(result))).into_response(),
        Err(e) => pipeline_error_response(&e),
    }
}

/// GET /api/v1/reports/:scan_id
pub async fn get_report(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(scan_id): Path<Uuid>,
) -> Response {
    match state.results.lookup_by_scan_id(scan_id) {
        Ok(Some(result)) => {
            crate::audit::report_accessed(scan_id, &requester_of(&headers));
            (StatusCode::OK, Json(AnalysisResponse::from(result))).into_response()
        }
        Ok(None) => ApiErrorResponse::not_found(format!("no report for scan {scan_id}")),
        Err(e) => {
            warn!(%scan_id, error = %e, "Report lookup failed");
            ApiErrorResponse::internal("report lookup failed")
        }
    }
}

/// GET /api/v1/artifacts/*key: serves heatmaps and FHIR documents.
pub async fn get_artifact(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    match state.blobs.get(&key) {
        Ok(Some(blob)) => {
            crate::audit::artifact_accessed(&key, &requester_of(&headers));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, blob.content_type)],
                blob.bytes,
            )
                .into_response()
        }
        Ok(None) => ApiErrorResponse::not_found(format!("no artifact at '{key}'")),
        Err(e) => {
            warn!(key, error = %e, "Artifact lookup failed");
            ApiErrorResponse::internal("artifact lookup failed")
        }
    }
}

/// Health payload for readiness probes and dashboards.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub stored_results: usize,
    pub disclaimer: String,
    pub pipeline: StatsSnapshot,
}

/// GET /api/v1/health
pub async fn health(State(state): State<ApiState>) -> Response {
    let body = HealthResponse {
        status: "ok",
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        stored_results: state.results.count(),
        disclaimer: state.disclaimer.clone(),
        pipeline: state.orchestrator.stats().snapshot(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Map a terminal pipeline failure onto its HTTP status and stable code.
fn pipeline_error_response(error: &PipelineError) -> Response {
    let (status, code) = match error {
        PipelineError::Validation(ValidationError::TooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE")
        }
        PipelineError::Validation(ValidationError::UnsupportedFormat) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FORMAT")
        }
        PipelineError::Validation(ValidationError::Corrupt) => {
            (StatusCode::BAD_REQUEST, "CORRUPT_IMAGE")
        }
        PipelineError::Validation(ValidationError::DimensionOutOfRange { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "DIMENSION_OUT_OF_RANGE")
        }
        PipelineError::Inference(crate::error::InferenceError::Timeout { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "INFERENCE_TIMEOUT")
        }
        PipelineError::Inference(crate::error::InferenceError::Backend(_)) => {
            (StatusCode::BAD_GATEWAY, "INFERENCE_FAILED")
        }
        PipelineError::CapacityExceeded => (StatusCode::TOO_MANY_REQUESTS, "CAPACITY_EXCEEDED"),
        PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };
    ApiErrorResponse::build(status, code, error.to_string())
}
