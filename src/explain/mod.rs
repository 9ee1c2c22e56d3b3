//! Explainability Renderer - activation heatmap overlays
//!
//! Turns the coarse activation grid retained by the classifier into a
//! color-mapped overlay on the original scan. Rendering is strictly
//! best-effort: any failure here degrades the result (no heatmap) rather
//! than failing the analysis, so the renderer never touches pipeline state
//! beyond its own output.

use async_trait::async_trait;
use image::{imageops, DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use tracing::debug;
use uuid::Uuid;

use crate::classifier::ActivationGrid;
use crate::error::RenderingError;
use crate::types::{HeatmapArtifact, Modality, ValidatedImage};

/// Blend weight of the original scan in the overlay; the remainder is the
/// colorized activation layer.
const IMAGE_WEIGHT: f32 = 0.6;

/// The rendering capability contract. Implementations must be shareable
/// across worker tasks.
#[async_trait]
pub trait HeatmapRenderer: Send + Sync {
    /// Render an overlay for one scan. `activations` is whatever the
    /// classifier retained; `None` means there is nothing to render.
    /// `target` names the condition the overlay explains, when known.
    async fn render(
        &self,
        scan_id: Uuid,
        image: &ValidatedImage,
        activations: Option<&ActivationGrid>,
        target: Option<&str>,
    ) -> Result<HeatmapArtifact, RenderingError>;
}

/// Default renderer: bilinear upsample of the activation grid, jet-style
/// colormap, alpha blend over the grayscale scan, PNG output.
pub struct OverlayRenderer;

#[async_trait]
impl HeatmapRenderer for OverlayRenderer {
    async fn render(
        &self,
        scan_id: Uuid,
        image: &ValidatedImage,
        activations: Option<&ActivationGrid>,
        target: Option<&str>,
    ) -> Result<HeatmapArtifact, RenderingError> {
        if image.modality == Modality::Mri {
            // Volumetric series need per-slice handling this renderer does
            // not attempt; the result degrades instead.
            return Err(RenderingError::UnsupportedModality(image.modality));
        }
        let grid = activations.ok_or(RenderingError::MissingActivations)?;
        if grid.values.is_empty() || grid.width == 0 || grid.height == 0 {
            return Err(RenderingError::MissingActivations);
        }

        let decoded = image::load_from_memory(&image.bytes)
            .map_err(|e| RenderingError::Encoding(e.to_string()))?;
        let overlay = compose_overlay(&decoded, grid);

        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(overlay)
            .write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| RenderingError::Encoding(e.to_string()))?;

        debug!(
            %scan_id,
            width = image.width,
            height = image.height,
            target = target.unwrap_or("none"),
            "Heatmap rendered"
        );

        Ok(HeatmapArtifact {
            scan_id,
            content_type: "image/png".to_string(),
            bytes: buf.into_inner(),
        })
    }
}

/// Blend the colorized, upsampled grid over the grayscale base image.
fn compose_overlay(base: &DynamicImage, grid: &ActivationGrid) -> RgbImage {
    let gray = base.to_luma8();
    let (w, h) = gray.dimensions();

    // Upsample the coarse grid to image resolution. Rendering via an
    // intermediate grayscale image keeps the interpolation in one place.
    let mut coarse = image::GrayImage::new(grid.width, grid.height);
    for y in 0..grid.height {
        for x in 0..grid.width {
            let v = (grid.at(x, y).clamp(0.0, 1.0) * 255.0) as u8;
            coarse.put_pixel(x, y, image::Luma([v]));
        }
    }
    let upsampled = imageops::resize(&coarse, w, h, imageops::FilterType::Triangle);

    RgbImage::from_fn(w, h, |x, y| {
        let base_v = f32::from(gray.get_pixel(x, y).0[0]);
        let activation = f32::from(upsampled.get_pixel(x, y).0[0]) / 255.0;
        let heat = jet(activation);
        Rgb([
            blend(base_v, f32::from(heat[0])),
            blend(base_v, f32::from(heat[1])),
            blend(base_v, f32::from(heat[2])),
        ])
    })
}

fn blend(base: f32, heat: f32) -> u8 {
    (base * IMAGE_WEIGHT + heat * (1.0 - IMAGE_WEIGHT)).round() as u8
}

/// Jet-style colormap: blue through cyan, green, yellow, to red.
fn jet(v: f32) -> [u8; 3] {
    let v = v.clamp(0.0, 1.0);
    let r = ((1.5 - (4.0 * v - 3.0).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    let g = ((1.5 - (4.0 * v - 2.0).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    let b = ((1.5 - (4.0 * v - 1.0).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    [r, g, b]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;

    fn validated(modality: Modality) -> ValidatedImage {
        let img = image::GrayImage::from_pixel(128, 128, image::Luma([90u8]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        crate::intake::validate(buf.into_inner(), modality, &IntakeConfig::default()).unwrap()
    }

    fn grid() -> ActivationGrid {
        ActivationGrid {
            width: 4,
            height: 4,
            values: (0..16).map(|i| i as f32 / 15.0).collect(),
        }
    }

    #[tokio::test]
    async fn test_render_produces_png() {
        let artifact = OverlayRenderer
            .render(
                Uuid::new_v4(),
                &validated(Modality::ChestXray),
                Some(&grid()),
                Some("Pneumonia"),
            )
            .await
            .unwrap();
        assert_eq!(artifact.content_type, "image/png");
        assert_eq!(&artifact.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn test_missing_activations_fails_softly() {
        let err = OverlayRenderer
            .render(Uuid::new_v4(), &validated(Modality::ChestXray), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderingError::MissingActivations));
    }

    #[tokio::test]
    async fn test_mri_is_unsupported() {
        let err = OverlayRenderer
            .render(Uuid::new_v4(), &validated(Modality::Mri), Some(&grid()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderingError::UnsupportedModality(_)));
    }

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet(0.0), [0, 0, 127]);
        assert_eq!(jet(1.0), [127, 0, 0]);
        assert_eq!(jet(0.5)[1], 255);
    }
}
