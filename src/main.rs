//! MediScan - Scan Analysis Service
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (config search: $MEDISCAN_CONFIG, ./mediscan.toml)
//! cargo run --release
//!
//! # Explicit config and bind address
//! ./mediscan --config /etc/mediscan/mediscan.toml --addr 0.0.0.0:9090
//!
//! # Point at a different model artifact
//! ./mediscan --model ./model/fixture_scores.toml
//! ```
//!
//! # Environment Variables
//!
//! - `MEDISCAN_CONFIG`: Path to the TOML config file
//! - `MEDISCAN_CORS_ORIGINS`: Comma-separated allowed CORS origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mediscan::api::{create_app, ApiState};
use mediscan::classifier::FixtureClassifier;
use mediscan::config::{self, ServiceConfig};
use mediscan::explain::OverlayRenderer;
use mediscan::pipeline::Orchestrator;
use mediscan::storage::{self, BlobStore, ResultStore, SledBlobStore, SledResultStore};

/// Default model artifact path when --model is not given.
const DEFAULT_MODEL_PATH: &str = "./model/fixture_scores.toml";

#[derive(Parser, Debug)]
#[command(name = "mediscan")]
#[command(about = "MediScan Scan Analysis Service")]
#[command(version)]
struct CliArgs {
    /// Override the server bind address (default from config: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to the TOML config file (overrides the search order)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the classifier model artifact
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    ArtifactPruner,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::ArtifactPruner => write!(f, "ArtifactPruner"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the periodic artifact retention sweep.
fn spawn_artifact_pruner(
    task_set: &mut JoinSet<Result<TaskName>>,
    blobs: Arc<dyn BlobStore>,
    interval_secs: u64,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[ArtifactPruner] Task starting with interval {}s", interval_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("[ArtifactPruner] Received shutdown signal");
                    return Ok(TaskName::ArtifactPruner);
                }
                _ = interval.tick() => {
                    match blobs.prune_expired() {
                        Ok(0) => {}
                        Ok(n) => info!("[ArtifactPruner] Removed {} expired artifacts", n),
                        Err(e) => warn!("[ArtifactPruner] Sweep failed: {}", e),
                    }
                }
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut service_config = match &args.config {
        Some(path) => ServiceConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServiceConfig::load(),
    };
    if let Some(addr) = args.addr {
        service_config.service.addr = addr;
    }

    let warnings = config::validation::validate(&service_config)
        .context("Configuration rejected at startup")?;
    for warning in &warnings {
        warn!("Config warning: {}", warning);
    }

    info!("MediScan Scan Analysis Service v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Vocabulary: {} conditions | workers: {} | queue: {}",
        service_config.triage.conditions.len(),
        service_config.pipeline.worker_pool_size,
        service_config.pipeline.queue_depth,
    );

    // Model artifact load is startup-fatal: serving without a classifier
    // would turn every request into an error.
    let classifier = Arc::new(
        FixtureClassifier::load(&args.model)
            .with_context(|| format!("Failed to load model artifact {}", args.model.display()))?,
    );

    let db = storage::open_database(&service_config.storage.data_dir)?;
    let results = Arc::new(SledResultStore::open(&db).context("Failed to open result store")?);
    let blobs: Arc<dyn BlobStore> = Arc::new(
        SledBlobStore::open(&db, service_config.storage.artifact_ttl_days)
            .context("Failed to open blob store")?,
    );
    info!(
        "Storage ready ({} stored results, TTL {} days)",
        results.count(),
        service_config.storage.artifact_ttl_days
    );

    let server_addr = service_config.service.addr.clone();
    let prune_interval = service_config.storage.prune_interval_secs;
    config::init(service_config.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        classifier,
        Arc::new(OverlayRenderer),
        Arc::clone(&results) as Arc<dyn ResultStore>,
        Arc::clone(&blobs),
        service_config,
    ));

    let state = ApiState {
        orchestrator,
        results,
        blobs: Arc::clone(&blobs),
        service_name: config::get().service.name.clone(),
        disclaimer: config::get().report.disclaimer.clone(),
        started_at: Instant::now(),
    };
    let max_image_bytes = config::get().intake.max_bytes;
    let app = create_app(state, max_image_bytes);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("HTTP server listening on {}", server_addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_artifact_pruner(&mut task_set, blobs, prune_interval, cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("MediScan shut down cleanly");
    Ok(())
}
