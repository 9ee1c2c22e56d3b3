//! Service configuration - every tunable as an operator-editable TOML value
//!
//! Each struct implements `Default` with values from `defaults.rs`, so a
//! missing file or section yields complete, working behavior.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::SeverityLevel;

/// Root configuration for a deployment.
///
/// Load with [`ServiceConfig::load`] which searches:
/// 1. `$MEDISCAN_CONFIG` env var
/// 2. `./mediscan.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceInfo,

    /// Intake validator limits
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Orchestrator concurrency and timeout tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Persistence paths and retention
    #[serde(default)]
    pub storage: StorageConfig,

    /// Report assembly
    #[serde(default)]
    pub report: ReportConfig,

    /// Severity triage policy: the closed condition vocabulary
    #[serde(default)]
    pub triage: TriageConfig,
}

/// Service identification and bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_service_name() -> String {
    "mediscan".to_string()
}

fn default_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            addr: default_addr(),
        }
    }
}

/// Intake validator limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub max_bytes: usize,
    pub min_dimension_px: u32,
    pub max_dimension_px: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_bytes: defaults::MAX_IMAGE_BYTES,
            min_dimension_px: defaults::MIN_DIMENSION_PX,
            max_dimension_px: defaults::MAX_DIMENSION_PX,
        }
    }
}

/// Orchestrator concurrency and timeout tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent analysis tasks. Classification is compute-bound, so this
    /// bounds the scarce resource directly.
    pub worker_pool_size: usize,
    /// Requests allowed to queue for a worker. Beyond pool + queue, new
    /// requests receive a capacity-exceeded rejection.
    pub queue_depth: usize,
    pub classify_timeout_ms: u64,
    pub render_timeout_ms: u64,
    pub persist_retry_max_attempts: u32,
    pub persist_retry_base_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: defaults::WORKER_POOL_SIZE,
            queue_depth: defaults::QUEUE_DEPTH,
            classify_timeout_ms: defaults::CLASSIFY_TIMEOUT_MS,
            render_timeout_ms: defaults::RENDER_TIMEOUT_MS,
            persist_retry_max_attempts: defaults::PERSIST_RETRY_MAX_ATTEMPTS,
            persist_retry_base_ms: defaults::PERSIST_RETRY_BASE_MS,
        }
    }
}

/// Persistence paths and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub artifact_ttl_days: u64,
    pub prune_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::DATA_DIR.to_string(),
            artifact_ttl_days: defaults::ARTIFACT_TTL_DAYS,
            prune_interval_secs: defaults::PRUNE_INTERVAL_SECS,
        }
    }
}

/// Report assembly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Copied verbatim into every report. Must be non-empty, enforced at
    /// startup by config validation.
    pub disclaimer: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            disclaimer: defaults::DISCLAIMER.to_string(),
        }
    }
}

/// Triage policy for one condition in the vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionPolicy {
    pub name: String,
    /// A condition fires when its confidence is >= this value (closed bound).
    pub threshold: f64,
    /// Severity contributed when the condition fires.
    pub weight: SeverityLevel,
    /// Firing forces the overall level to URGENT regardless of weights.
    #[serde(default)]
    pub urgent_trigger: bool,
}

/// The closed condition vocabulary with per-condition triage policy.
///
/// Adding a condition is a configuration change, not a code change; the set
/// is validated (non-empty, no duplicates, thresholds in range) at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    pub conditions: Vec<ConditionPolicy>,
}

impl TriageConfig {
    /// Vocabulary names in configured order.
    pub fn vocabulary(&self) -> Vec<String> {
        self.conditions.iter().map(|c| c.name.clone()).collect()
    }

    pub fn policy_of(&self, name: &str) -> Option<&ConditionPolicy> {
        self.conditions.iter().find(|c| c.name == name)
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        // 14-label chest pathology vocabulary. Pneumothorax is the sole
        // urgent trigger with a deliberately low threshold: a tension
        // pneumothorax at modest confidence still warrants escalation.
        let policy = |name: &str, threshold: f64, weight: SeverityLevel, urgent: bool| {
            ConditionPolicy {
                name: name.to_string(),
                threshold,
                weight,
                urgent_trigger: urgent,
            }
        };
        Self {
            conditions: vec![
                policy("Atelectasis", 0.50, SeverityLevel::Mild, false),
                policy("Cardiomegaly", 0.50, SeverityLevel::Moderate, false),
                policy("Consolidation", 0.50, SeverityLevel::Moderate, false),
                policy("Edema", 0.50, SeverityLevel::Severe, false),
                policy("Pleural Effusion", 0.50, SeverityLevel::Mild, false),
                policy("Emphysema", 0.50, SeverityLevel::Mild, false),
                policy("Fibrosis", 0.50, SeverityLevel::Mild, false),
                policy("Hernia", 0.50, SeverityLevel::Mild, false),
                policy("Infiltration", 0.50, SeverityLevel::Mild, false),
                policy("Mass", 0.50, SeverityLevel::Severe, false),
                policy("Nodule", 0.50, SeverityLevel::Moderate, false),
                policy("Pleural Thickening", 0.50, SeverityLevel::Mild, false),
                policy("Pneumonia", 0.50, SeverityLevel::Moderate, false),
                policy("Pneumothorax", 0.15, SeverityLevel::Severe, true),
            ],
        }
    }
}

/// Config load/parse errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ServiceConfig {
    /// Load configuration using the standard search order:
    /// 1. `$MEDISCAN_CONFIG` environment variable
    /// 2. `./mediscan.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("MEDISCAN_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded service config from MEDISCAN_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from MEDISCAN_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "MEDISCAN_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("mediscan.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded service config from ./mediscan.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./mediscan.toml, using defaults");
                }
            }
        }

        info!("No mediscan.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_full_vocabulary() {
        let config = ServiceConfig::default();
        assert_eq!(config.triage.conditions.len(), 14);
        assert!(config.triage.policy_of("Pneumothorax").is_some());
    }

    #[test]
    fn test_default_urgent_triggers() {
        let config = ServiceConfig::default();
        let urgent: Vec<&str> = config
            .triage
            .conditions
            .iter()
            .filter(|c| c.urgent_trigger)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(urgent, vec!["Pneumothorax"]);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let parsed: ServiceConfig = toml::from_str(
            r#"
            [intake]
            max_bytes = 1048576
            min_dimension_px = 32
            max_dimension_px = 2048
            "#,
        )
        .unwrap();
        assert_eq!(parsed.intake.max_bytes, 1_048_576);
        assert_eq!(parsed.pipeline.worker_pool_size, defaults::WORKER_POOL_SIZE);
        assert!(!parsed.report.disclaimer.is_empty());
    }

    #[test]
    fn test_triage_policy_roundtrip() {
        let toml_src = r#"
            [[triage.conditions]]
            name = "Pneumonia"
            threshold = 0.5
            weight = "MODERATE"

            [[triage.conditions]]
            name = "Pneumothorax"
            threshold = 0.15
            weight = "SEVERE"
            urgent_trigger = true
        "#;
        let parsed: ServiceConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.triage.conditions.len(), 2);
        let ptx = parsed.triage.policy_of("Pneumothorax").unwrap();
        assert!(ptx.urgent_trigger);
        assert_eq!(ptx.weight, SeverityLevel::Severe);
    }
}
