//! Severity Triage Engine
//!
//! Pure policy evaluation: the configured condition policies plus an aligned
//! confidence set in, a severity level and its contributing conditions out.
//! No I/O, no clock, no randomness: identical inputs always produce the
//! identical outcome, which is what makes replayed scans byte-stable.
//!
//! A condition "fires" when its confidence reaches its threshold (closed
//! bound). The overall level is the maximum weight among fired conditions,
//! forced to URGENT when any fired condition is an urgent trigger. Nothing
//! fired means NORMAL.

use tracing::debug;

use crate::config::TriageConfig;
use crate::types::{ConditionScore, ConditionSet, SeverityLevel, TriageOutcome};

/// Evaluate the triage policy over an aligned condition set.
pub fn evaluate(policy: &TriageConfig, conditions: &ConditionSet) -> TriageOutcome {
    let mut severity = SeverityLevel::Normal;
    let mut contributing: Vec<ConditionScore> = Vec::new();

    for rule in &policy.conditions {
        let Some(confidence) = conditions.confidence_of(&rule.name) else {
            continue;
        };
        if confidence < rule.threshold {
            continue;
        }

        if rule.urgent_trigger {
            severity = SeverityLevel::Urgent;
        } else {
            severity = severity.max(rule.weight);
        }
        contributing.push(ConditionScore {
            name: rule.name.clone(),
            confidence,
        });
    }

    // Descending confidence; the stable sort keeps vocabulary order on ties.
    contributing.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(
        severity = %severity,
        fired = contributing.len(),
        "Triage evaluated"
    );

    TriageOutcome {
        severity,
        contributing,
    }
}
