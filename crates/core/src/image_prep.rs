//! Image preparation before transmission.
//!
//! Photos are decoded, scaled down so the longer side is at most
//! [`ImagePolicy::max_dimension`] (aspect ratio preserved), and re-encoded
//! as JPEG at a fixed quality. The output dimensions depend only on the
//! input dimensions and the policy.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};

use crate::error::EstimationError;

/// Longer-side limit applied before upload.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// JPEG quality factor (percent) used for re-encoding.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Resize and re-encode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePolicy {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImagePolicy {
    pub fn validate(&self) -> Result<(), EstimationError> {
        if self.max_dimension == 0 {
            return Err(EstimationError::InvalidInput(
                "Max image dimension must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(EstimationError::InvalidInput(format!(
                "JPEG quality must be within 1..=100 (got {})",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// A decoded, resized and JPEG re-encoded photo ready for upload.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    /// The resized pixels, for on-device detectors.
    pub pixels: DynamicImage,
}

impl PreparedImage {
    pub fn was_resized(&self) -> bool {
        self.width != self.original_width || self.height != self.original_height
    }
}

/// Output dimensions for an image of `width` x `height` under `max_dimension`.
///
/// Images already within the limit are left alone. Otherwise
/// `scale = max_dimension / max(width, height)` and each side becomes
/// `round(side * scale)`, never less than 1.
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longer as f64;
    let scale_side = |side: u32| ((side as f64 * scale).round() as u32).max(1);
    (scale_side(width), scale_side(height))
}

/// Decode `bytes`, apply the resize policy and re-encode as JPEG.
pub fn prepare_image(bytes: &[u8], policy: &ImagePolicy) -> Result<PreparedImage, EstimationError> {
    policy.validate()?;

    if bytes.is_empty() {
        return Err(EstimationError::InvalidInput("Image is empty".to_string()));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| EstimationError::InvalidInput(format!("Image could not be decoded: {e}")))?;

    let (original_width, original_height) = (decoded.width(), decoded.height());
    let (width, height) = scaled_dimensions(original_width, original_height, policy.max_dimension);

    let pixels = if (width, height) == (original_width, original_height) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Lanczos3)
    };

    let jpeg = encode_jpeg(&pixels, policy.jpeg_quality)?;

    tracing::debug!(
        original_width,
        original_height,
        width,
        height,
        input_bytes = bytes.len(),
        output_bytes = jpeg.len(),
        "Prepared image for estimation",
    );

    Ok(PreparedImage {
        jpeg,
        width,
        height,
        original_width,
        original_height,
        pixels,
    })
}

/// Encode as baseline RGB JPEG. Alpha is dropped.
fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EstimationError> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| EstimationError::Internal(format!("JPEG encoding failed: {e}")))?;
    Ok(buffer)
}
