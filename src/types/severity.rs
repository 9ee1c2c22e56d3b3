//! Severity classification levels for analysis results

use serde::{Deserialize, Serialize};

/// Overall severity of a scan, ordered from least to most concerning.
///
/// The derived `Ord` gives `Normal < Mild < Moderate < Severe < Urgent`.
/// `Urgent` is absorbing within a single request: once the triage engine
/// selects it, nothing downstream may downgrade it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityLevel {
    #[default]
    Normal,
    Mild,
    Moderate,
    Severe,
    Urgent,
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityLevel::Normal => write!(f, "NORMAL"),
            SeverityLevel::Mild => write!(f, "MILD"),
            SeverityLevel::Moderate => write!(f, "MODERATE"),
            SeverityLevel::Severe => write!(f, "SEVERE"),
            SeverityLevel::Urgent => write!(f, "URGENT"),
        }
    }
}
