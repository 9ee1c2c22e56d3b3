//! Intake Validator - rejects malformed uploads before any inference cost
//!
//! Checks run cheapest-first: emptiness, size, format signature, then pixel
//! dimensions (header probe only; the full decode happens later, inside the
//! renderer, if at all). The validator performs no I/O and logs only
//! metadata, never image content.

use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

use crate::config::IntakeConfig;
use crate::error::ValidationError;
use crate::types::{ImageEncoding, Modality, ValidatedImage};

/// Validate an uploaded payload against configured limits.
///
/// Fails fast with a specific reason; no partial validation state is
/// retained on failure.
pub fn validate(
    bytes: Vec<u8>,
    modality: Modality,
    limits: &IntakeConfig,
) -> Result<ValidatedImage, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Corrupt);
    }

    if bytes.len() > limits.max_bytes {
        return Err(ValidationError::TooLarge {
            actual: bytes.len(),
            max: limits.max_bytes,
        });
    }

    let encoding = match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => ImageEncoding::Png,
        Ok(ImageFormat::Jpeg) => ImageEncoding::Jpeg,
        Ok(_) => return Err(ValidationError::UnsupportedFormat),
        Err(_) => return Err(ValidationError::UnsupportedFormat),
    };

    // Header-only probe: reads dimensions without decoding pixel data.
    let reader = image::io::Reader::with_format(Cursor::new(&bytes), encoding_format(encoding));
    let (width, height) = reader
        .into_dimensions()
        .map_err(|_| ValidationError::Corrupt)?;

    let (min, max) = (limits.min_dimension_px, limits.max_dimension_px);
    if width < min || height < min || width > max || height > max {
        return Err(ValidationError::DimensionOutOfRange {
            width,
            height,
            min,
            max,
        });
    }

    debug!(
        bytes = bytes.len(),
        width,
        height,
        encoding = encoding.content_type(),
        modality = ?modality,
        "Intake validation passed"
    );

    Ok(ValidatedImage {
        bytes,
        encoding,
        width,
        height,
        modality,
    })
}

fn encoding_format(encoding: ImageEncoding) -> ImageFormat {
    match encoding {
        ImageEncoding::Png => ImageFormat::Png,
        ImageEncoding::Jpeg => ImageFormat::Jpeg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;

    /// Encode a solid grayscale PNG of the given dimensions.
    pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::GrayImage::from_pixel(width, height, image::Luma([128u8]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn limits() -> IntakeConfig {
        IntakeConfig {
            max_bytes: 1024 * 1024,
            min_dimension_px: 64,
            max_dimension_px: 2048,
        }
    }

    #[test]
    fn test_valid_png_accepted() {
        let validated = validate(test_png(224, 224), Modality::ChestXray, &limits()).unwrap();
        assert_eq!(validated.width, 224);
        assert_eq!(validated.height, 224);
        assert_eq!(validated.encoding, ImageEncoding::Png);
    }

    #[test]
    fn test_empty_payload_is_corrupt() {
        let err = validate(Vec::new(), Modality::ChestXray, &limits()).unwrap_err();
        assert!(matches!(err, ValidationError::Corrupt));
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let mut small = limits();
        small.max_bytes = 16;
        let err = validate(test_png(224, 224), Modality::ChestXray, &small).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { .. }));
    }

    #[test]
    fn test_non_image_rejected() {
        let err = validate(
            b"%PDF-1.4 not an image".to_vec(),
            Modality::ChestXray,
            &limits(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFormat));
    }

    #[test]
    fn test_truncated_image_rejected() {
        let mut png = test_png(224, 224);
        png.truncate(12); // valid signature, no header
        let err = validate(png, Modality::ChestXray, &limits()).unwrap_err();
        assert!(matches!(err, ValidationError::Corrupt));
    }

    #[test]
    fn test_undersized_dimensions_rejected() {
        let err = validate(test_png(16, 16), Modality::ChestXray, &limits()).unwrap_err();
        assert!(matches!(err, ValidationError::DimensionOutOfRange { .. }));
    }
}
