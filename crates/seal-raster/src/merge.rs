use crate::format::{decode, encode_jpeg};
use image::{imageops, DynamicImage, RgbImage};
use seal_types::{Result, SealError};
use tracing::debug;

/// Stack images top to bottom in the given order into one JPEG.
///
/// The canvas is as wide as the widest image and as tall as all of them
/// together; narrower images leave a black strip on the right.
pub fn vertical_stack(images: &[Vec<u8>], jpeg_quality: u8) -> Result<Vec<u8>> {
    let decoded = images
        .iter()
        .map(|bytes| decode(bytes).map(|img| img.to_rgb8()))
        .collect::<Result<Vec<_>>>()?;

    let width = decoded.iter().map(RgbImage::width).max().unwrap_or(0);
    let height = decoded
        .iter()
        .try_fold(0u32, |acc, img| acc.checked_add(img.height()))
        .ok_or_else(|| SealError::format("merged image would be too tall"))?;
    if width == 0 || height == 0 {
        return Err(SealError::format(format!(
            "merged canvas would be {width}x{height}"
        )));
    }
    debug!(count = decoded.len(), width, height, "merging images");

    let mut canvas = RgbImage::new(width, height);
    let mut offset = 0i64;
    for img in &decoded {
        imageops::replace(&mut canvas, img, 0, offset);
        offset += i64::from(img.height());
    }
    encode_jpeg(&DynamicImage::ImageRgb8(canvas), jpeg_quality)
}
