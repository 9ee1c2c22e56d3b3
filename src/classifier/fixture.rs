//! Fixture classifier backend - deterministic scores from a TOML artifact
//!
//! Stands in for a real vision model in development deployments and
//! integration tests while exercising the full capability lifecycle: the
//! score table is a required model artifact loaded once at startup, and a
//! missing or malformed artifact refuses startup exactly like missing
//! network weights would.
//!
//! Scores come from the artifact; activations are synthesized from the
//! image's block-averaged luminance so the renderer has a real, image-
//! dependent grid to overlay.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::{ActivationGrid, Classifier, ClassifierInitError, Inference};
use crate::error::InferenceError;
use crate::types::ValidatedImage;

/// Side length of the synthesized activation grid.
const GRID_SIZE: u32 = 14;

#[derive(Debug, Deserialize)]
struct FixtureArtifact {
    /// Condition name -> confidence in [0, 1].
    scores: BTreeMap<String, f64>,
}

/// Deterministic classifier backed by a score-table artifact.
#[derive(Debug)]
pub struct FixtureClassifier {
    scores: Vec<(String, f64)>,
}

impl FixtureClassifier {
    /// Load the score table from a TOML artifact. Load once, immutable
    /// thereafter; failure here must abort startup.
    pub fn load(path: &Path) -> Result<Self, ClassifierInitError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ClassifierInitError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let artifact: FixtureArtifact = toml::from_str(&contents)
            .map_err(|e| ClassifierInitError::Malformed(e.to_string()))?;

        for (name, score) in &artifact.scores {
            if !(0.0..=1.0).contains(score) {
                return Err(ClassifierInitError::Malformed(format!(
                    "score {score} for '{name}' outside [0, 1]"
                )));
            }
        }

        info!(
            path = %path.display(),
            labels = artifact.scores.len(),
            "Fixture classifier loaded"
        );

        Ok(Self {
            scores: artifact.scores.into_iter().collect(),
        })
    }

    /// Construct directly from a score table (tests).
    pub fn from_scores(scores: Vec<(String, f64)>) -> Self {
        Self { scores }
    }
}

#[async_trait]
impl Classifier for FixtureClassifier {
    fn backend_name(&self) -> &'static str {
        "fixture"
    }

    async fn classify(&self, image: &ValidatedImage) -> Result<Inference, InferenceError> {
        let activations = luminance_grid(image);
        Ok(Inference {
            scores: self.scores.clone(),
            activations,
        })
    }
}

/// Block-average the image's luminance into a normalized GRID_SIZE² grid.
fn luminance_grid(image: &ValidatedImage) -> Option<ActivationGrid> {
    let decoded = image::load_from_memory(&image.bytes).ok()?;
    let gray = decoded.to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let mut values = vec![0.0f32; (GRID_SIZE * GRID_SIZE) as usize];
    for gy in 0..GRID_SIZE {
        for gx in 0..GRID_SIZE {
            let x0 = gx * w / GRID_SIZE;
            let x1 = ((gx + 1) * w / GRID_SIZE).max(x0 + 1).min(w);
            let y0 = gy * h / GRID_SIZE;
            let y1 = ((gy + 1) * h / GRID_SIZE).max(y0 + 1).min(h);

            let mut sum = 0u64;
            let mut count = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += u64::from(gray.get_pixel(x, y).0[0]);
                    count += 1;
                }
            }
            values[(gy * GRID_SIZE + gx) as usize] = if count == 0 {
                0.0
            } else {
                (sum as f32 / count as f32) / 255.0
            };
        }
    }

    // Normalize to span [0, 1] so the overlay uses the full colormap.
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > min {
        for v in &mut values {
            *v = (*v - min) / (max - min);
        }
    }

    Some(ActivationGrid {
        width: GRID_SIZE,
        height: GRID_SIZE,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;
    use crate::types::Modality;

    fn test_image() -> ValidatedImage {
        let img = image::GrayImage::from_fn(128, 128, |x, _| image::Luma([(x * 2) as u8]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        crate::intake::validate(
            buf.into_inner(),
            Modality::ChestXray,
            &IntakeConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fixture_returns_artifact_scores() {
        let clf = FixtureClassifier::from_scores(vec![("Pneumonia".to_string(), 0.87)]);
        let inference = clf.classify(&test_image()).await.unwrap();
        assert_eq!(inference.scores, vec![("Pneumonia".to_string(), 0.87)]);
    }

    #[tokio::test]
    async fn test_activations_are_deterministic_and_normalized() {
        let clf = FixtureClassifier::from_scores(vec![]);
        let img = test_image();
        let a = clf.classify(&img).await.unwrap().activations.unwrap();
        let b = clf.classify(&img).await.unwrap().activations.unwrap();
        assert_eq!(a.values, b.values);
        assert!(a.values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(a.values.len(), (GRID_SIZE * GRID_SIZE) as usize);
    }

    #[test]
    fn test_missing_artifact_is_init_error() {
        let err = FixtureClassifier::load(Path::new("/nonexistent/scores.toml")).unwrap_err();
        assert!(matches!(err, ClassifierInitError::Io { .. }));
    }

    #[test]
    fn test_out_of_range_score_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.toml");
        std::fs::write(&path, "[scores]\nPneumonia = 1.8\n").unwrap();
        let err = FixtureClassifier::load(&path).unwrap_err();
        assert!(matches!(err, ClassifierInitError::Malformed(_)));
    }
}
