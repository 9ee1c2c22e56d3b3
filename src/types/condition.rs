//! Condition confidence vectors produced by the classifier capability

use serde::{Deserialize, Serialize};

/// One condition from the configured vocabulary with its confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionScore {
    pub name: String,
    pub confidence: f64,
}

/// Full per-condition confidence vector: exactly one entry per vocabulary
/// member, held in vocabulary order.
///
/// Conditions the classifier abstained on carry confidence 0.0, so the
/// vector length is always the vocabulary length regardless of what the
/// backend actually returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConditionSet {
    scores: Vec<ConditionScore>,
}

impl ConditionSet {
    /// Build a set from raw classifier output, aligned to the vocabulary.
    ///
    /// Scores for names outside the vocabulary are dropped; missing names
    /// default to 0.0; confidences are clamped into [0, 1]. Non-finite
    /// values read as 0.0: NaN passes through `clamp` and does not survive
    /// a JSON round trip.
    pub fn from_raw(vocabulary: &[String], raw: &[(String, f64)]) -> Self {
        let scores = vocabulary
            .iter()
            .map(|name| {
                let confidence = raw
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, c)| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 })
                    .unwrap_or(0.0);
                ConditionScore {
                    name: name.clone(),
                    confidence,
                }
            })
            .collect();
        Self { scores }
    }

    /// Scores in vocabulary order.
    pub fn scores(&self) -> &[ConditionScore] {
        &self.scores
    }

    /// Scores ordered by descending confidence. Equal confidences keep
    /// vocabulary order (stable sort), so the result is deterministic.
    pub fn by_descending_confidence(&self) -> Vec<ConditionScore> {
        let mut sorted = self.scores.clone();
        sorted.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    /// Confidence for a named condition, if it is in the vocabulary.
    pub fn confidence_of(&self, name: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.confidence)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<String> {
        vec![
            "Pneumonia".to_string(),
            "Pleural Effusion".to_string(),
            "Pneumothorax".to_string(),
        ]
    }

    #[test]
    fn test_abstained_conditions_default_to_zero() {
        let set = ConditionSet::from_raw(&vocab(), &[("Pneumonia".to_string(), 0.8)]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.confidence_of("Pleural Effusion"), Some(0.0));
        assert_eq!(set.confidence_of("Pneumothorax"), Some(0.0));
    }

    #[test]
    fn test_out_of_vocabulary_scores_dropped() {
        let set = ConditionSet::from_raw(&vocab(), &[("Fracture".to_string(), 0.9)]);
        assert_eq!(set.confidence_of("Fracture"), None);
        assert!(set.scores().iter().all(|s| s.confidence == 0.0));
    }

    #[test]
    fn test_confidence_clamped() {
        let set = ConditionSet::from_raw(&vocab(), &[("Pneumonia".to_string(), 1.7)]);
        assert_eq!(set.confidence_of("Pneumonia"), Some(1.0));
    }

    #[test]
    fn test_non_finite_confidence_reads_as_zero() {
        let set = ConditionSet::from_raw(
            &vocab(),
            &[
                ("Pneumonia".to_string(), f64::NAN),
                ("Pneumothorax".to_string(), f64::INFINITY),
            ],
        );
        assert_eq!(set.confidence_of("Pneumonia"), Some(0.0));
        assert_eq!(set.confidence_of("Pneumothorax"), Some(0.0));
        // A zeroed NaN must not fire anything downstream.
        let json = serde_json::to_string(set.scores()).unwrap();
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_descending_order_is_stable_on_ties() {
        let set = ConditionSet::from_raw(
            &vocab(),
            &[
                ("Pneumothorax".to_string(), 0.5),
                ("Pneumonia".to_string(), 0.5),
            ],
        );
        let ordered = set.by_descending_confidence();
        // Tie at 0.5 resolves to vocabulary order: Pneumonia first.
        assert_eq!(ordered[0].name, "Pneumonia");
        assert_eq!(ordered[1].name, "Pneumothorax");
    }
}
