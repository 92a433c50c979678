//! Drawing a prepared seal onto a raster target

use crate::format::{decode, encode_jpeg};
use crate::preprocess::ProcessedSeal;
use image::{imageops, DynamicImage};
use seal_types::{PlacementPoint, Result, SealError};
use tracing::debug;

/// Top row for a seal centred vertically on `row`, kept inside the target.
pub fn vertical_anchor(row: f64, seal_height: f64, target_height: f64) -> f64 {
    let half = seal_height / 2.0;
    (row - half).max(0.0).min(target_height - half)
}

/// Composite `seal` onto a copy of `target` and re-encode as JPEG.
///
/// `placement` is bottom-left; it is mapped to a pixel row exactly once here.
pub fn composite(
    target: &[u8],
    seal: &ProcessedSeal,
    placement: &PlacementPoint,
    jpeg_quality: u8,
) -> Result<Vec<u8>> {
    let base = decode(target)?;
    let (width, height) = (f64::from(base.width()), f64::from(base.height()));
    let point = PlacementPoint::checked(placement.target, placement.x, placement.y, width, height)?;

    let row = point.pixel_row(height);
    let top = vertical_anchor(row, f64::from(seal.height), height);
    debug!(target = point.target, x = point.x, row, top, "compositing seal onto image");

    let stamp = seal.to_rgba()?;
    let mut canvas = base.to_rgba8();
    imageops::overlay(&mut canvas, &stamp, point.x.round() as i64, top.round() as i64);
    encode_jpeg(&DynamicImage::ImageRgba8(canvas), jpeg_quality)
}

/// Pixel dimensions of a target image, rejecting empty ones.
pub fn target_dimensions(target: &[u8]) -> Result<(u32, u32)> {
    let image = decode(target)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(SealError::format("target image is empty"));
    }
    Ok((image.width(), image.height()))
}
