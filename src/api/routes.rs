//! API route definitions
//!
//! - POST /api/v1/analyze        - multipart scan upload, synchronous analysis
//! - GET  /api/v1/reports/:id    - retrieve a finished analysis by scan id
//! - GET  /api/v1/artifacts/*key - heatmap overlays and FHIR documents
//! - GET  /api/v1/health         - readiness probe with pipeline counters

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Create all v1 API routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/reports/:scan_id", get(handlers::get_report))
        .route("/artifacts/*key", get(handlers::get_artifact))
        .route("/health", get(handlers::health))
        .with_state(state)
}
