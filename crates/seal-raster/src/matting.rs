//! Background removal for seal images.
//!
//! A stamp scanned on paper comes with a light, roughly uniform background.
//! Pixels brighter than the threshold become fully transparent, the rest stay
//! fully opaque with their original colour.

use crate::format::{decode, encode_png};
use image::{DynamicImage, Rgba, RgbaImage};
use seal_types::Result;
use tracing::debug;

/// Default luminance cutoff (0..=255).
pub const DEFAULT_THRESHOLD: u8 = 165;

/// ITU-R BT.601 luma, the weighting scanners and most grayscale
/// conversions use.
fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

/// Remove the light background of `bytes`, returning PNG bytes with alpha.
///
/// Inputs that already carry an alpha channel are returned untouched, so
/// matting an already matted seal is a no-op.
pub fn matte(bytes: &[u8], threshold: u8) -> Result<Vec<u8>> {
    let image = decode(bytes)?;
    if image.color().channel_count() == 4 {
        debug!("seal already has alpha, skipping matting");
        return Ok(bytes.to_vec());
    }
    let matted = matte_image(&image, threshold);
    encode_png(&DynamicImage::ImageRgba8(matted))
}

pub(crate) fn matte_image(image: &DynamicImage, threshold: u8) -> RgbaImage {
    let rgb = image.to_rgb8();
    let cutoff = f32::from(threshold);
    let mut out = RgbaImage::new(rgb.width(), rgb.height());
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let matted = if luma(r, g, b).round() <= cutoff {
            Rgba([r, g, b, 255])
        } else {
            Rgba([0, 0, 0, 0])
        };
        out.put_pixel(x, y, matted);
    }
    out
}
