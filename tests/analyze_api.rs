//! End-to-end API tests: multipart upload through to the stored report.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use mediscan::api::{create_app, ApiState};
use mediscan::classifier::{ActivationGrid, Classifier, Inference};
use mediscan::config::ServiceConfig;
use mediscan::error::{InferenceError, RenderingError};
use mediscan::explain::{HeatmapRenderer, OverlayRenderer};
use mediscan::pipeline::Orchestrator;
use mediscan::storage::{SledBlobStore, SledResultStore};
use mediscan::types::{HeatmapArtifact, ValidatedImage};

/// Classifier returning fixed scores and counting its invocations.
struct CountingClassifier {
    scores: Vec<(String, f64)>,
    calls: AtomicU32,
}

impl CountingClassifier {
    fn new(scores: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            scores: scores.iter().map(|(n, c)| ((*n).to_string(), *c)).collect(),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Classifier for CountingClassifier {
    fn backend_name(&self) -> &'static str {
        "counting"
    }

    async fn classify(&self, _image: &ValidatedImage) -> Result<Inference, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Inference {
            scores: self.scores.clone(),
            activations: Some(ActivationGrid {
                width: 2,
                height: 2,
                values: vec![0.0, 0.3, 0.6, 1.0],
            }),
        })
    }
}

/// Renderer that always fails, for degradation coverage.
struct BrokenRenderer;

#[async_trait]
impl HeatmapRenderer for BrokenRenderer {
    async fn render(
        &self,
        _scan_id: uuid::Uuid,
        _image: &ValidatedImage,
        _activations: Option<&ActivationGrid>,
        _target: Option<&str>,
    ) -> Result<HeatmapArtifact, RenderingError> {
        Err(RenderingError::Encoding("broken for test".to_string()))
    }
}

fn test_app_with(
    classifier: Arc<dyn Classifier>,
    renderer: Arc<dyn HeatmapRenderer>,
    config: ServiceConfig,
) -> Router {
    let db = Arc::new(sled::Config::new().temporary(true).open().unwrap());
    let results = Arc::new(SledResultStore::open(&db).unwrap());
    let blobs = Arc::new(SledBlobStore::open(&db, 30).unwrap());
    let max_bytes = config.intake.max_bytes;
    let orchestrator = Arc::new(Orchestrator::new(
        classifier,
        renderer,
        results.clone(),
        blobs.clone(),
        config,
    ));
    let state = ApiState {
        orchestrator,
        results,
        blobs,
        service_name: "mediscan".to_string(),
        disclaimer: "test disclaimer".to_string(),
        started_at: Instant::now(),
    };
    create_app(state, max_bytes)
}

fn test_app(classifier: Arc<dyn Classifier>) -> Router {
    test_app_with(classifier, Arc::new(OverlayRenderer), ServiceConfig::default())
}

fn test_png(shade: u8) -> Vec<u8> {
    let img = image::GrayImage::from_pixel(128, 128, image::Luma([shade]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

fn multipart_body(file: &[u8], modality: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(b"\r\n");
    if let Some(m) = modality {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"modality\"\r\n\r\n{m}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn analyze_request(file: &[u8], modality: Option<&str>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::AUTHORIZATION, "Bearer test-token")
        .body(Body::from(multipart_body(file, modality)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_analyze_returns_structured_report() {
    let app = test_app(CountingClassifier::new(&[
        ("Pneumonia", 0.87),
        ("Pleural Effusion", 0.43),
    ]));

    let response = app
        .oneshot(analyze_request(&test_png(100), Some("chest-x-ray")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["severity"], "MODERATE");
    assert_eq!(body["contributing"][0]["name"], "Pneumonia");
    assert_eq!(body["conditions"].as_array().unwrap().len(), 14);
    assert_eq!(body["degraded"], false);
    assert!(body["heatmap_url"].as_str().unwrap().starts_with("/api/v1/artifacts/"));
    assert!(!body["report"]["disclaimer"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_replay_returns_same_report_without_reclassifying() {
    let classifier = CountingClassifier::new(&[("Pneumonia", 0.87)]);
    let app = test_app(classifier.clone());

    let first = app
        .clone()
        .oneshot(analyze_request(&test_png(50), None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = json_body(first).await;
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);

    let replay = app
        .oneshot(analyze_request(&test_png(50), None))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::OK);
    let replay_body = json_body(replay).await;

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(replay_body["scan_id"], first_body["scan_id"]);
    assert_eq!(replay_body["report"], first_body["report"]);
}

#[tokio::test]
async fn test_renderer_failure_degrades_result() {
    let app = test_app_with(
        CountingClassifier::new(&[("Pneumonia", 0.87)]),
        Arc::new(BrokenRenderer),
        ServiceConfig::default(),
    );

    let response = app
        .oneshot(analyze_request(&test_png(60), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["degraded"], true);
    assert!(body["heatmap_url"].is_null());
    assert_eq!(body["severity"], "MODERATE");
}

#[tokio::test]
async fn test_non_image_upload_is_unsupported_media_type() {
    let app = test_app(CountingClassifier::new(&[]));

    let response = app
        .oneshot(analyze_request(b"just some text", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn test_unknown_modality_is_rejected() {
    let app = test_app(CountingClassifier::new(&[]));

    let response = app
        .oneshot(analyze_request(&test_png(70), Some("ultrasound")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_report_lookup_roundtrip() {
    let app = test_app(CountingClassifier::new(&[("Edema", 0.71)]));

    let created = app
        .clone()
        .oneshot(analyze_request(&test_png(80), None))
        .await
        .unwrap();
    let created_body = json_body(created).await;
    let scan_id = created_body["scan_id"].as_str().unwrap().to_string();

    let fetched = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/reports/{scan_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let fetched_body = json_body(fetched).await;
    assert_eq!(fetched_body["severity"], "SEVERE");
    assert_eq!(fetched_body["scan_id"].as_str().unwrap(), scan_id);
}

#[tokio::test]
async fn test_unknown_report_is_not_found() {
    let app = test_app(CountingClassifier::new(&[]));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/reports/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_heatmap_artifact_is_served() {
    let app = test_app(CountingClassifier::new(&[("Pneumonia", 0.87)]));

    let created = app
        .clone()
        .oneshot(analyze_request(&test_png(90), None))
        .await
        .unwrap();
    let body = json_body(created).await;
    let heatmap_url = body["heatmap_url"].as_str().unwrap().to_string();

    // Artifact writes land on a background task.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let artifact = app
        .oneshot(
            Request::builder()
                .uri(heatmap_url)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(artifact.status(), StatusCode::OK);
    assert_eq!(
        artifact.headers()[header::CONTENT_TYPE],
        "image/png"
    );
    let bytes = axum::body::to_bytes(artifact.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_capacity_exhaustion_returns_429() {
    struct SlowClassifier;

    #[async_trait]
    impl Classifier for SlowClassifier {
        fn backend_name(&self) -> &'static str {
            "slow"
        }
        async fn classify(&self, _image: &ValidatedImage) -> Result<Inference, InferenceError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Inference {
                scores: vec![],
                activations: None,
            })
        }
    }

    let mut config = ServiceConfig::default();
    config.pipeline.worker_pool_size = 1;
    config.pipeline.queue_depth = 0;
    let app = test_app_with(Arc::new(SlowClassifier), Arc::new(OverlayRenderer), config);

    let busy_app = app.clone();
    let busy = tokio::spawn(async move {
        busy_app
            .oneshot(analyze_request(&test_png(1), None))
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rejected = app
        .oneshot(analyze_request(&test_png(2), None))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(rejected).await;
    assert_eq!(body["error"]["code"], "CAPACITY_EXCEEDED");

    assert_eq!(busy.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_pipeline_counters() {
    let app = test_app(CountingClassifier::new(&[("Pneumonia", 0.87)]));

    app.clone()
        .oneshot(analyze_request(&test_png(40), None))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "mediscan");
    assert!(!body["disclaimer"].as_str().unwrap().is_empty());
    assert_eq!(body["pipeline"]["received"], 1);
    assert_eq!(body["pipeline"]["completed"], 1);
    assert_eq!(body["stored_results"], 1);
}
