//! Pipeline orchestrator - admission, state machine, recovery policies

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::classifier::{Classifier, Inference};
use crate::config::ServiceConfig;
use crate::error::{InferenceError, PipelineError, RenderingError, StorageError};
use crate::explain::HeatmapRenderer;
use crate::storage::{BlobStore, InsertOutcome, ResultStore};
use crate::types::{AnalysisResult, ConditionSet, HeatmapArtifact, ScanRequest};
use crate::{audit, intake, report, triage};

/// Ceiling on one persistence retry backoff step.
const PERSIST_BACKOFF_CAP_MS: u64 = 10_000;

/// Pipeline counters, cheap enough to bump on every request.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: AtomicU64,
    pub completed: AtomicU64,
    pub replayed: AtomicU64,
    pub degraded: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
}

/// Point-in-time view of the counters for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub completed: u64,
    pub replayed: u64,
    pub degraded: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Drives one scan through the full analysis state machine.
///
/// Constructed once at startup and shared (`Arc`) with every API handler.
pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    renderer: Arc<dyn HeatmapRenderer>,
    results: Arc<dyn ResultStore>,
    blobs: Arc<dyn BlobStore>,
    config: ServiceConfig,
    /// Bounds concurrent classification work.
    workers: Arc<Semaphore>,
    /// In-flight analyses, including those queued for a worker permit.
    in_flight: Arc<AtomicUsize>,
    /// Admission ceiling: worker pool plus queue depth.
    capacity: usize,
    stats: Arc<PipelineStats>,
}

/// Decrements the in-flight count when an admitted analysis finishes,
/// regardless of outcome.
struct AdmissionGuard(Arc<AtomicUsize>);

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        renderer: Arc<dyn HeatmapRenderer>,
        results: Arc<dyn ResultStore>,
        blobs: Arc<dyn BlobStore>,
        config: ServiceConfig,
    ) -> Self {
        let pool = config.pipeline.worker_pool_size;
        let capacity = pool + config.pipeline.queue_depth;
        info!(
            workers = pool,
            capacity,
            classifier = classifier.backend_name(),
            "Pipeline orchestrator ready"
        );
        Self {
            classifier,
            renderer,
            results,
            blobs,
            config,
            workers: Arc::new(Semaphore::new(pool)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            capacity,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run one scan through the pipeline to a terminal state.
    ///
    /// The analysis itself runs on a detached task: once admitted, it runs
    /// to completion even if the caller disconnects and this future is
    /// dropped.
    pub async fn analyze(self: &Arc<Self>, request: ScanRequest) -> Result<AnalysisResult, PipelineError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        audit::scan_received(&request);

        // Validation happens before admission: rejecting a malformed upload
        // must not consume pipeline capacity.
        let image = intake::validate(
            request.image_bytes.clone(),
            request.modality,
            &self.config.intake,
        )
        .map_err(|e| {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            audit::scan_failed(&request, &e.to_string());
            PipelineError::from(e)
        })?;

        // Replay: byte-identical content short-circuits to the stored
        // result. The classifier is never re-invoked.
        match self.results.lookup(&request.content_hash) {
            Ok(Some(existing)) => {
                self.stats.replayed.fetch_add(1, Ordering::Relaxed);
                audit::scan_replayed(&request, &existing);
                return Ok(existing);
            }
            Ok(None) => {}
            Err(e) => {
                // A failed replay probe degrades to a fresh analysis; the
                // write-once insert still guarantees a single stored result.
                warn!(scan_id = %request.scan_id, error = %e, "Replay lookup failed, analyzing fresh");
            }
        }

        let guard = self.try_admit().ok_or_else(|| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            audit::scan_rejected(&request);
            PipelineError::CapacityExceeded
        })?;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            this.run_admitted(request, image).await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                Err(PipelineError::Internal(format!("analysis task failed: {e}")))
            }
        }
    }

    /// Reserve an in-flight slot, or refuse when pool and queue are full.
    fn try_admit(&self) -> Option<AdmissionGuard> {
        let prev = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if prev >= self.capacity {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(AdmissionGuard(Arc::clone(&self.in_flight)))
    }

    /// The admitted portion of the state machine: classify through persist.
    async fn run_admitted(
        self: Arc<Self>,
        request: ScanRequest,
        image: crate::types::ValidatedImage,
    ) -> Result<AnalysisResult, PipelineError> {
        let permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| PipelineError::Internal("worker pool closed".to_string()))?;

        let inference = match self.classify_with_retry(&image).await {
            Ok(inference) => inference,
            Err(e) => {
                drop(permit);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                audit::scan_failed(&request, &e.to_string());
                return Err(PipelineError::from(e));
            }
        };
        drop(permit);

        let vocabulary = self.config.triage.vocabulary();
        let conditions = ConditionSet::from_raw(&vocabulary, &inference.scores);

        // The overlay explains the highest-confidence condition. Taken from
        // the raw scores so rendering need not wait on triage.
        let top_condition = conditions
            .by_descending_confidence()
            .first()
            .map(|c| c.name.clone());

        // Triage and rendering are independent reads of the inference; run
        // them side by side.
        let render_timeout = Duration::from_millis(self.config.pipeline.render_timeout_ms);
        let (outcome, rendered) = tokio::join!(
            async { triage::evaluate(&self.config.triage, &conditions) },
            self.render_bounded(
                &request,
                &image,
                &inference,
                top_condition.as_deref(),
                render_timeout
            ),
        );

        let heatmap = match rendered {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                // Degradation, not failure: the report ships without an
                // overlay.
                warn!(scan_id = %request.scan_id, error = %e, "Heatmap rendering failed, degrading result");
                self.stats.degraded.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        let structured = report::assemble(request.modality, &outcome, &self.config.report);
        let hash = request.content_hash.as_str();
        let result = AnalysisResult {
            scan_id: request.scan_id,
            content_hash: request.content_hash.clone(),
            modality: request.modality,
            severity: outcome.severity,
            conditions,
            contributing: outcome.contributing,
            report: structured,
            heatmap_key: heatmap.as_ref().map(|_| format!("heatmaps/{hash}.png")),
            fhir_key: Some(format!("fhir/{hash}.json")),
            created_at: Utc::now(),
        };

        let result = self.persist(result, heatmap, &request).await;
        audit::scan_completed(&result);
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    /// Classify with the configured timeout; a timeout is retried exactly
    /// once before the scan fails. Backend faults are never retried; the
    /// second answer would be no more trustworthy than the first.
    async fn classify_with_retry(
        &self,
        image: &crate::types::ValidatedImage,
    ) -> Result<Inference, InferenceError> {
        let timeout_ms = self.config.pipeline.classify_timeout_ms;
        let budget = Duration::from_millis(timeout_ms);

        match timeout(budget, self.classifier.classify(image)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms, "Classification timed out, retrying once");
                match timeout(budget, self.classifier.classify(image)).await {
                    Ok(result) => result,
                    Err(_) => Err(InferenceError::Timeout { timeout_ms }),
                }
            }
        }
    }

    async fn render_bounded(
        &self,
        request: &ScanRequest,
        image: &crate::types::ValidatedImage,
        inference: &Inference,
        target: Option<&str>,
        budget: Duration,
    ) -> Result<HeatmapArtifact, RenderingError> {
        match timeout(
            budget,
            self.renderer
                .render(request.scan_id, image, inference.activations.as_ref(), target),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RenderingError::Timeout {
                timeout_ms: budget.as_millis() as u64,
            }),
        }
    }

    /// Persist the result write-once; on a lost race the stored winner
    /// replaces the computed result. Artifact writes (and a failed result
    /// insert) retry on a detached task so the response is never held up.
    async fn persist(
        self: &Arc<Self>,
        result: AnalysisResult,
        heatmap: Option<HeatmapArtifact>,
        request: &ScanRequest,
    ) -> AnalysisResult {
        match self.results.insert_if_absent(&result) {
            Ok(InsertOutcome::Inserted) => {
                self.spawn_artifact_writes(&result, heatmap);
                result
            }
            Ok(InsertOutcome::Existing(existing)) => {
                // A concurrent identical upload won the insert; its result
                // is canonical and our artifacts are dropped.
                info!(
                    scan_id = %request.scan_id,
                    winner = %existing.scan_id,
                    "Concurrent duplicate resolved to stored result"
                );
                *existing
            }
            Err(e) => {
                error!(scan_id = %result.scan_id, error = %e, "Result insert failed, retrying in background");
                self.spawn_insert_retry(result.clone(), heatmap);
                result
            }
        }
    }

    fn spawn_artifact_writes(&self, result: &AnalysisResult, heatmap: Option<HeatmapArtifact>) {
        let blobs = Arc::clone(&self.blobs);
        let pipeline = self.config.pipeline.clone();
        let fhir_doc = report::fhir::to_diagnostic_report(result);
        let heatmap_key = result.heatmap_key.clone();
        let fhir_key = result.fhir_key.clone();
        let scan_id = result.scan_id;

        tokio::spawn(async move {
            if let (Some(key), Some(artifact)) = (heatmap_key, heatmap) {
                write_with_backoff(
                    blobs.as_ref(),
                    &key,
                    &artifact.content_type,
                    artifact.bytes,
                    &pipeline,
                )
                .await;
            }
            if let Some(key) = fhir_key {
                match serde_json::to_vec(&fhir_doc) {
                    Ok(bytes) => {
                        write_with_backoff(
                            blobs.as_ref(),
                            &key,
                            "application/fhir+json",
                            bytes,
                            &pipeline,
                        )
                        .await;
                    }
                    Err(e) => error!(%scan_id, error = %e, "FHIR document serialization failed"),
                }
            }
        });
    }

    fn spawn_insert_retry(&self, result: AnalysisResult, heatmap: Option<HeatmapArtifact>) {
        let this = Arc::new(self.clone_refs());
        tokio::spawn(async move {
            let pipeline = this.config.pipeline.clone();
            for attempt in 1..=pipeline.persist_retry_max_attempts {
                tokio::time::sleep(backoff_delay(&pipeline, attempt)).await;
                match this.results.insert_if_absent(&result) {
                    Ok(InsertOutcome::Inserted) => {
                        info!(scan_id = %result.scan_id, attempt, "Deferred result insert succeeded");
                        this.spawn_artifact_writes(&result, heatmap);
                        return;
                    }
                    Ok(InsertOutcome::Existing(_)) => return,
                    Err(e) => {
                        warn!(scan_id = %result.scan_id, attempt, error = %e, "Deferred result insert failed");
                    }
                }
            }
            error!(scan_id = %result.scan_id, "Result insert abandoned after max retries");
        });
    }

    /// Shallow clone sharing every component behind its `Arc`.
    fn clone_refs(&self) -> Self {
        Self {
            classifier: Arc::clone(&self.classifier),
            renderer: Arc::clone(&self.renderer),
            results: Arc::clone(&self.results),
            blobs: Arc::clone(&self.blobs),
            config: self.config.clone(),
            workers: Arc::clone(&self.workers),
            in_flight: Arc::clone(&self.in_flight),
            capacity: self.capacity,
            stats: Arc::clone(&self.stats),
        }
    }
}

fn backoff_delay(pipeline: &crate::config::PipelineConfig, attempt: u32) -> Duration {
    let exp = pipeline
        .persist_retry_base_ms
        .saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(PERSIST_BACKOFF_CAP_MS))
}

async fn write_with_backoff(
    blobs: &dyn BlobStore,
    key: &str,
    content_type: &str,
    bytes: Vec<u8>,
    pipeline: &crate::config::PipelineConfig,
) {
    let mut last_err: Option<StorageError> = None;
    for attempt in 0..pipeline.persist_retry_max_attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(pipeline, attempt)).await;
        }
        match blobs.put(key, content_type, bytes.clone()) {
            Ok(()) => return,
            Err(e) => {
                warn!(key, attempt, error = %e, "Artifact write failed");
                last_err = Some(e);
            }
        }
    }
    if let Some(e) = last_err {
        error!(key, error = %e, "Artifact write abandoned after max retries");
    }
}
