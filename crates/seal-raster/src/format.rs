//! Sniffing, decoding and re-encoding of the raster formats we accept

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use seal_types::{Result, SealError};
use std::io::Cursor;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    /// Identify a raster by its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_MAGIC) {
            Some(RasterFormat::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(RasterFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Decode a JPEG or PNG. Anything else is a `Format` error.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = RasterFormat::sniff(bytes)
        .ok_or_else(|| SealError::format("expected a JPEG or PNG image"))?;
    image::load_from_memory_with_format(bytes, format.image_format())
        .map_err(|e| SealError::format(format!("failed to decode {}: {e}", format.mime())))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| SealError::format(format!("failed to encode PNG: {e}")))?;
    Ok(out.into_inner())
}

/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| SealError::format(format!("failed to encode JPEG: {e}")))?;
    Ok(out)
}
