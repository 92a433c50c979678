//! Proportional downscaling of a seal relative to the target it lands on

use crate::format::{decode, encode_png};
use image::imageops::FilterType;
use image::DynamicImage;
use seal_types::{Result, SealError};
use tracing::debug;

/// New dimensions so that `w * h` fits in `target_area`, or `None` when the
/// image already fits. Aspect ratio is kept; neither side drops below 1.
pub fn scaled_dimensions(width: u32, height: u32, target_area: f64) -> Option<(u32, u32)> {
    let current = f64::from(width) * f64::from(height);
    if current <= target_area || current == 0.0 {
        return None;
    }
    let ratio = (target_area.max(0.0) / current).sqrt();
    let scale = |side: u32| ((f64::from(side) * ratio).round() as u32).max(1);
    Some((scale(width), scale(height)))
}

/// Target pixel area for a seal covering `percent` of `reference_area`.
pub fn target_area(reference_area: f64, percent: f64) -> Result<f64> {
    if !(percent > 0.0 && percent <= 100.0) || !reference_area.is_finite() {
        return Err(SealError::validation(format!(
            "seal percentage must be in (0, 100], got {percent}"
        )));
    }
    Ok(reference_area * percent / 100.0)
}

pub(crate) fn fit_image(image: DynamicImage, target_area: f64) -> (DynamicImage, bool) {
    match scaled_dimensions(image.width(), image.height(), target_area) {
        Some((w, h)) => {
            debug!(
                from_width = image.width(),
                from_height = image.height(),
                to_width = w,
                to_height = h,
                "downscaling seal"
            );
            (image.resize_exact(w, h, FilterType::CatmullRom), true)
        }
        None => (image, false),
    }
}

/// Shrink `bytes` so its area is at most `percent`% of `reference_area`.
///
/// Images already within bounds come back byte-for-byte unchanged; scaled
/// images are re-encoded as PNG so alpha survives.
pub fn scale_to_area(bytes: &[u8], reference_area: f64, percent: f64) -> Result<Vec<u8>> {
    let target = target_area(reference_area, percent)?;
    let image = decode(bytes)?;
    match fit_image(image, target) {
        (scaled, true) => encode_png(&scaled),
        (_, false) => Ok(bytes.to_vec()),
    }
}
