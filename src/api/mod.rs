//! REST API module using Axum
//!
//! Thin HTTP surface over the pipeline orchestrator: uploads in, structured
//! reports and artifacts out. Handlers own no pipeline logic; every policy
//! decision (limits, retries, degradation) lives behind the orchestrator.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the configured image size limit.
/// The exact image limit is enforced by the intake validator.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `MEDISCAN_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development deployments with a separate frontend.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("MEDISCAN_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        }
        Err(_) => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState, max_image_bytes: usize) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .layer(DefaultBodyLimit::max(
            max_image_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
}
