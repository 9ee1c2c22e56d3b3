//! FHIR R4 DiagnosticReport export
//!
//! Maps a finished analysis into an interoperable `DiagnosticReport`
//! document for downstream EHR integration. Built as a `serde_json::Value`
//! rather than a typed model: the service only ever writes these documents,
//! and the handful of fields used here does not justify a full FHIR crate.

use base64::Engine;
use serde_json::{json, Value};

use crate::types::{AnalysisResult, SeverityLevel};

/// LOINC code for a diagnostic imaging study report.
const LOINC_IMAGING_STUDY: &str = "18748-4";

/// Build the FHIR R4 DiagnosticReport document for one analysis result.
pub fn to_diagnostic_report(result: &AnalysisResult) -> Value {
    let conclusion_codes: Vec<Value> = result
        .contributing
        .iter()
        .map(|c| {
            json!({
                "text": c.name,
                "extension": [{
                    "url": "http://mediscan.local/fhir/StructureDefinition/confidence",
                    "valueDecimal": c.confidence,
                }],
            })
        })
        .collect();

    let presented_text = format!(
        "TECHNIQUE: {}\n\nFINDINGS: {}\n\nIMPRESSION: {}\n\nRECOMMENDATION: {}\n\n{}",
        result.report.technique,
        result.report.findings,
        result.report.impression,
        result.report.recommendation,
        result.report.disclaimer,
    );

    json!({
        "resourceType": "DiagnosticReport",
        "id": result.scan_id.to_string(),
        // Automated output pending radiologist review.
        "status": "preliminary",
        "category": [{
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/v2-0074",
                "code": "RAD",
                "display": "Radiology",
            }],
        }],
        "code": {
            "coding": [{
                "system": "http://loinc.org",
                "code": LOINC_IMAGING_STUDY,
                "display": "Diagnostic imaging study",
            }],
            "text": format!("Automated {} analysis", result.modality.display_name()),
        },
        "effectiveDateTime": result.created_at.to_rfc3339(),
        "issued": result.created_at.to_rfc3339(),
        "conclusion": format!(
            "{} {} {}",
            result.report.impression, result.report.recommendation, result.report.disclaimer,
        ),
        "conclusionCode": conclusion_codes,
        "presentedForm": [{
            "contentType": "text/plain",
            "data": base64::engine::general_purpose::STANDARD.encode(presented_text),
        }],
        "extension": [{
            "url": "http://mediscan.local/fhir/StructureDefinition/severity",
            "valueCode": severity_code(result.severity),
        }, {
            "url": "http://mediscan.local/fhir/StructureDefinition/content-hash",
            "valueString": result.content_hash.as_str(),
        }],
    })
}

fn severity_code(severity: SeverityLevel) -> &'static str {
    match severity {
        SeverityLevel::Urgent => "urgent",
        SeverityLevel::Severe => "severe",
        SeverityLevel::Moderate => "moderate",
        SeverityLevel::Mild => "mild",
        SeverityLevel::Normal => "normal",
    }
}
