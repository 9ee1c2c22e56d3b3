//! Report Assembler - structured findings from the triage outcome
//!
//! Deterministic template assembly over the triage outcome. The four
//! sections (technique, findings, impression, recommendation) are derived
//! purely from modality, contributing conditions, and severity; the
//! disclaimer is copied verbatim from configuration. The same inputs always
//! assemble the same text, which keeps replayed scans byte-identical.

pub mod fhir;

use crate::config::ReportConfig;
use crate::types::{Modality, SeverityLevel, StructuredReport, TriageOutcome};

/// Assemble the structured report for one analysis.
pub fn assemble(
    modality: Modality,
    outcome: &TriageOutcome,
    config: &ReportConfig,
) -> StructuredReport {
    StructuredReport {
        technique: technique(modality),
        findings: findings(outcome),
        impression: impression(outcome),
        recommendation: recommendation(outcome.severity).to_string(),
        disclaimer: config.disclaimer.clone(),
    }
}

fn technique(modality: Modality) -> String {
    format!(
        "Single {} acquired and processed by automated multi-label analysis.",
        modality.display_name()
    )
}

fn findings(outcome: &TriageOutcome) -> String {
    if outcome.contributing.is_empty() {
        return "No significant abnormalities identified above reporting thresholds.".to_string();
    }
    let listed: Vec<String> = outcome
        .contributing
        .iter()
        .map(|c| format!("{} (confidence {:.0}%)", c.name, c.confidence * 100.0))
        .collect();
    format!("Findings suggestive of: {}.", listed.join(", "))
}

fn impression(outcome: &TriageOutcome) -> String {
    match outcome.severity {
        SeverityLevel::Normal => {
            "No acute cardiopulmonary abnormality detected by automated analysis.".to_string()
        }
        severity => {
            let primary = outcome
                .contributing
                .first()
                .map_or("abnormality", |c| c.name.as_str());
            format!(
                "Automated analysis indicates {severity} priority findings, most consistent with {primary}."
            )
        }
    }
}

/// Severity-keyed follow-up recommendation.
fn recommendation(severity: SeverityLevel) -> &'static str {
    match severity {
        SeverityLevel::Urgent => {
            "Immediate clinical correlation advised. Escalate to the attending physician without delay."
        }
        SeverityLevel::Severe => {
            "Prompt clinical correlation recommended. Radiologist review within 24 hours."
        }
        SeverityLevel::Moderate => {
            "Clinical correlation recommended. Consider follow-up imaging as clinically indicated."
        }
        SeverityLevel::Mild => {
            "Routine follow-up recommended. Correlate with clinical presentation."
        }
        SeverityLevel::Normal => {
            "No immediate follow-up indicated. Continue routine screening intervals."
        }
    }
}
