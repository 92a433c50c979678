use crate::format::{decode, encode_png, RasterFormat};
use crate::matting::{matte, DEFAULT_THRESHOLD};
use crate::scale::{fit_image, target_area};
use image::RgbaImage;
use seal_types::{Result, SealError};
use tracing::debug;

/// Seal image ready to be drawn: matted, scaled, and encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessedSeal {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: RasterFormat,
}

impl ProcessedSeal {
    pub fn to_rgba(&self) -> Result<RgbaImage> {
        Ok(decode(&self.bytes)?.to_rgba8())
    }

    pub fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }
}

impl std::fmt::Debug for ProcessedSeal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedSeal")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Matting and scaling with a configurable luminance cutoff.
///
/// The PDF path scales against the page area and the raster path against
/// each image's own area, so the reference area and share are arguments
/// rather than settings.
#[derive(Debug, Clone, Copy)]
pub struct SealPreprocessor {
    threshold: u8,
}

impl Default for SealPreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SealPreprocessor {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Matte the raw seal. Run once per request; the result feeds every
    /// [`SealPreprocessor::fit`] call.
    pub fn matte(&self, seal: &[u8]) -> Result<Vec<u8>> {
        matte(seal, self.threshold)
    }

    /// Scale an already matted seal to `percent`% of `reference_area`.
    pub fn fit(&self, matted: &[u8], reference_area: f64, percent: f64) -> Result<ProcessedSeal> {
        let format = RasterFormat::sniff(matted)
            .ok_or_else(|| SealError::format("seal must be a JPEG or PNG image"))?;
        let target = target_area(reference_area, percent)?;
        let (image, scaled) = fit_image(decode(matted)?, target);
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(SealError::format("seal image is empty"));
        }

        let (bytes, format) = if scaled {
            (encode_png(&image)?, RasterFormat::Png)
        } else {
            (matted.to_vec(), format)
        };
        debug!(width, height, ?format, "seal prepared");
        Ok(ProcessedSeal {
            bytes,
            width,
            height,
            format,
        })
    }

    pub fn preprocess(&self, seal: &[u8], reference_area: f64, percent: f64) -> Result<ProcessedSeal> {
        let matted = self.matte(seal)?;
        self.fit(&matted, reference_area, percent)
    }
}
