//! Startup config validation: fatal errors plus non-fatal warnings.
//!
//! Fatal conditions (empty disclaimer, empty or duplicated vocabulary,
//! out-of-range thresholds, a zero-sized worker pool) refuse startup:
//! serving with a broken triage policy is worse than not serving. Suspicious
//! but workable values only warn.

use std::collections::HashSet;

use super::service_config::{ConfigError, ServiceConfig};

/// A non-fatal config warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded config. Returns warnings on success, an error when the
/// config must not be served.
pub fn validate(config: &ServiceConfig) -> Result<Vec<ValidationWarning>, ConfigError> {
    let mut warnings = Vec::new();

    // Disclaimer is a correctness invariant, not cosmetics.
    if config.report.disclaimer.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "report.disclaimer must not be empty".to_string(),
        ));
    }

    // The condition vocabulary must be a closed, non-empty, duplicate-free set.
    if config.triage.conditions.is_empty() {
        return Err(ConfigError::Invalid(
            "triage.conditions must list at least one condition".to_string(),
        ));
    }
    let mut seen: HashSet<&str> = HashSet::new();
    for policy in &config.triage.conditions {
        if policy.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "triage.conditions contains an unnamed condition".to_string(),
            ));
        }
        if !seen.insert(policy.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate condition '{}' in triage.conditions",
                policy.name
            )));
        }
        if !(0.0..=1.0).contains(&policy.threshold) {
            return Err(ConfigError::Invalid(format!(
                "threshold {} for '{}' outside [0, 1]",
                policy.threshold, policy.name
            )));
        }
        if policy.threshold == 0.0 {
            warnings.push(ValidationWarning {
                field: format!("triage.conditions.{}", policy.name),
                message: "threshold 0.0 means this condition always fires".to_string(),
            });
        }
    }

    if config.pipeline.worker_pool_size == 0 {
        return Err(ConfigError::Invalid(
            "pipeline.worker_pool_size must be at least 1".to_string(),
        ));
    }
    if config.pipeline.worker_pool_size > 64 {
        warnings.push(ValidationWarning {
            field: "pipeline.worker_pool_size".to_string(),
            message: format!(
                "{} concurrent inference tasks is unusually high for a compute-bound stage",
                config.pipeline.worker_pool_size
            ),
        });
    }
    if config.pipeline.classify_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "pipeline.classify_timeout_ms must be non-zero".to_string(),
        ));
    }

    if config.intake.min_dimension_px >= config.intake.max_dimension_px {
        return Err(ConfigError::Invalid(format!(
            "intake.min_dimension_px ({}) must be below intake.max_dimension_px ({})",
            config.intake.min_dimension_px, config.intake.max_dimension_px
        )));
    }
    if config.intake.max_bytes == 0 {
        return Err(ConfigError::Invalid(
            "intake.max_bytes must be non-zero".to_string(),
        ));
    }

    if config.storage.artifact_ttl_days == 0 {
        warnings.push(ValidationWarning {
            field: "storage.artifact_ttl_days".to_string(),
            message: "TTL of 0 days prunes artifacts on the next sweep".to_string(),
        });
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn test_default_config_validates_clean() {
        let warnings = validate(&ServiceConfig::default()).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_empty_disclaimer_is_fatal() {
        let mut config = ServiceConfig::default();
        config.report.disclaimer = "   ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_condition_is_fatal() {
        let mut config = ServiceConfig::default();
        let dup = config.triage.conditions[0].clone();
        config.triage.conditions.push(dup);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_out_of_range_threshold_is_fatal() {
        let mut config = ServiceConfig::default();
        config.triage.conditions[0].threshold = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_is_fatal() {
        let mut config = ServiceConfig::default();
        config.pipeline.worker_pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_threshold_warns() {
        let mut config = ServiceConfig::default();
        config.triage.conditions[0].threshold = 0.0;
        let warnings = validate(&config).unwrap();
        assert_eq!(warnings.len(), 1);
    }
}
