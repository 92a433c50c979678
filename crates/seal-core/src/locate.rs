//! Keyword location across PDFs and images
//!
//! PDFs are searched through their text layer first. Only when that finds
//! nothing (or cannot be read) are pages rasterized and handed to OCR.

use image::GrayImage;
use seal_pdf::{find_keyword, EmbeddedImageRasterizer, PageRasterizer, PdfDocument};
use seal_raster::ocr::OcrPipeline;
use seal_types::{ErrorKind, Result, SealError, TextLocation};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct KeywordLocator {
    ocr: Option<Arc<OcrPipeline>>,
    rasterizer: Arc<dyn PageRasterizer>,
    dpi: u32,
}

impl KeywordLocator {
    pub fn new(ocr: Option<Arc<OcrPipeline>>, rasterizer: Arc<dyn PageRasterizer>, dpi: u32) -> Self {
        Self { ocr, rasterizer, dpi }
    }

    /// Text layer search only.
    pub fn text_only() -> Self {
        Self::new(None, Arc::new(EmbeddedImageRasterizer), 300)
    }

    /// Text layer first, then OCR over embedded page images.
    pub fn with_ocr(pipeline: Arc<OcrPipeline>, dpi: u32) -> Self {
        Self::new(Some(pipeline), Arc::new(EmbeddedImageRasterizer), dpi)
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    fn pipeline(&self) -> Result<&OcrPipeline> {
        self.ocr
            .as_deref()
            .ok_or_else(|| SealError::validation("searching images requires an OCR engine"))
    }

    /// Every match in document order, bottom-left page points.
    pub fn locate_pdf(&self, pdf: &PdfDocument, keyword: &str) -> Result<Vec<TextLocation>> {
        match find_keyword(pdf, keyword) {
            Ok(hits) if !hits.is_empty() => {
                info!(keyword, hits = hits.len(), "keyword found in text layer");
                return Ok(hits);
            }
            Ok(_) => debug!(keyword, "no text layer match"),
            Err(e) if e.kind() == ErrorKind::Format => {
                warn!(error = %e, "text layer unreadable, falling back to OCR");
            }
            Err(e) => return Err(e),
        }

        let Some(pipeline) = self.ocr.as_deref() else {
            return Err(SealError::NotFound(format!(
                "keyword {keyword:?} not found in the text layer"
            )));
        };
        let hits = self.ocr_pdf(pipeline, pdf, keyword)?;
        if hits.is_empty() {
            return Err(SealError::NotFound(format!(
                "keyword {keyword:?} not found by text layer or OCR"
            )));
        }
        info!(keyword, hits = hits.len(), "keyword found by OCR");
        Ok(hits)
    }

    fn ocr_pdf(&self, pipeline: &OcrPipeline, pdf: &PdfDocument, keyword: &str) -> Result<Vec<TextLocation>> {
        let mut hits = Vec::new();
        for page in 0..pdf.page_count() {
            let Some(image) = self.rasterizer.rasterize(pdf, page, self.dpi)? else {
                continue;
            };
            let (page_w, page_h) = pdf.page_size(page)?;
            let sx = page_w / f64::from(image.width());
            let sy = page_h / f64::from(image.height());
            let found = match pipeline.find_keyword(&image, keyword, page) {
                Ok(found) => found,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(page = page + 1, "no text detected");
                    continue;
                }
                Err(e) => return Err(e),
            };
            // OCR reports bottom-left pixels; pages are measured in points.
            hits.extend(
                found
                    .into_iter()
                    .map(|hit| TextLocation::bottom_left(page, hit.x * sx, hit.y * sy)),
            );
        }
        Ok(hits)
    }

    /// Matches on one raster target, bottom-left pixels. An image without
    /// the keyword gives an empty list; the caller decides whether the set
    /// as a whole came up empty.
    pub fn locate_image(&self, image: &GrayImage, target: usize, keyword: &str) -> Result<Vec<TextLocation>> {
        let hits = match self.pipeline()?.find_keyword(image, keyword, target) {
            Ok(hits) => hits,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target = target + 1, "no text detected");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if hits.is_empty() {
            debug!(keyword, target = target + 1, "keyword not on image");
        } else {
            info!(keyword, target = target + 1, hits = hits.len(), "keyword found on image");
        }
        Ok(hits)
    }

    /// Recognized text of one image, line by line in reading order.
    pub fn image_lines(&self, image: &GrayImage) -> Result<Vec<String>> {
        self.pipeline()?.extract_lines(image)
    }

    /// Text of every page: the text layer where present, OCR otherwise.
    pub fn pdf_lines(&self, pdf: &PdfDocument) -> Result<Vec<String>> {
        let texts = seal_pdf::text::page_texts(pdf).or_else(|e| match e.kind() {
            ErrorKind::Format => Ok(vec![String::new(); pdf.page_count()]),
            _ => Err(e),
        })?;

        let mut lines = Vec::new();
        for (page, text) in texts.iter().enumerate() {
            if !text.trim().is_empty() {
                lines.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
                continue;
            }
            let Some(pipeline) = self.ocr.as_deref() else {
                continue;
            };
            if let Some(image) = self.rasterizer.rasterize(pdf, page, self.dpi)? {
                match pipeline.extract_lines(&image) {
                    Ok(found) => lines.extend(found),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(lines)
    }
}

impl std::fmt::Debug for KeywordLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordLocator")
            .field("ocr", &self.ocr.is_some())
            .field("dpi", &self.dpi)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ocr_pipeline, pdf_with_text, FixedRasterizer};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_layer_wins() {
        let pdf = PdfDocument::from_bytes(&pdf_with_text(&[Some(("SUBTOTAL", 300, 400))])).unwrap();
        // An OCR engine that would report something else is never consulted.
        let locator = KeywordLocator::new(
            Some(ocr_pipeline(&[("SUBTOTAL", 0.0, 0.0, 10.0, 10.0)])),
            Arc::new(FixedRasterizer::new(100, 100)),
            72,
        );
        let hits = locator.locate_pdf(&pdf, "SUBTOTAL").unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].x - 300.0).abs() < 0.5);
        assert!((hits[0].y - 400.0).abs() < 0.5);
    }

    #[test]
    fn test_ocr_fallback_scales_to_points() {
        // Two scanned pages rendered at 2 pixels per point.
        let pdf = PdfDocument::from_bytes(&pdf_with_text(&[None, None])).unwrap();
        let locator = KeywordLocator::new(
            Some(ocr_pipeline(&[("SEAL", 200.0, 300.0, 80.0, 20.0)])),
            Arc::new(FixedRasterizer::new(1224, 1584)),
            144,
        );
        let hits = locator.locate_pdf(&pdf, "SEAL").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].target, 0);
        assert_eq!(hits[1].target, 1);
        // Third corner (280, 320) px from the top -> (140, 792 - 160) pt.
        assert!((hits[0].x - 140.0).abs() < 0.01);
        assert!((hits[0].y - 632.0).abs() < 0.01);
    }

    #[test]
    fn test_no_match_anywhere() {
        let pdf = PdfDocument::from_bytes(&pdf_with_text(&[Some(("Other", 10, 10))])).unwrap();
        let err = KeywordLocator::text_only().locate_pdf(&pdf, "SEAL").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let locator = KeywordLocator::new(
            Some(ocr_pipeline(&[("Nope", 0.0, 0.0, 10.0, 10.0)])),
            Arc::new(FixedRasterizer::new(100, 100)),
            72,
        );
        assert_eq!(locator.locate_pdf(&pdf, "SEAL").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_image_hit_is_bottom_left() {
        let locator = KeywordLocator::with_ocr(ocr_pipeline(&[("SUBTOTAL", 250.0, 420.0, 50.0, 30.0)]), 300);
        let image = GrayImage::new(1000, 1400);
        let hits = locator.locate_image(&image, 0, "SUBTOTAL").unwrap();
        assert_eq!(hits, vec![TextLocation::bottom_left(0, 300.0, 950.0)]);
    }

    #[test]
    fn test_image_without_keyword_is_empty() {
        let locator = KeywordLocator::with_ocr(ocr_pipeline(&[("TOTAL", 250.0, 420.0, 50.0, 30.0)]), 300);
        let hits = locator.locate_image(&GrayImage::new(600, 800), 1, "SUBTOTAL").unwrap();
        assert!(hits.is_empty());

        // Nothing detected at all is an empty result too.
        let locator = KeywordLocator::with_ocr(ocr_pipeline(&[]), 300);
        assert!(locator.locate_image(&GrayImage::new(600, 800), 0, "SUBTOTAL").unwrap().is_empty());
    }

    #[test]
    fn test_image_search_needs_ocr() {
        let err = KeywordLocator::text_only()
            .locate_image(&GrayImage::new(10, 10), 0, "x")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_pdf_lines_prefers_text_layer() {
        let pdf = PdfDocument::from_bytes(&pdf_with_text(&[Some(("Hello", 10, 10)), None])).unwrap();
        let locator = KeywordLocator::new(
            Some(ocr_pipeline(&[("scanned", 5.0, 5.0, 30.0, 10.0)])),
            Arc::new(FixedRasterizer::new(100, 100)),
            72,
        );
        assert_eq!(locator.pdf_lines(&pdf).unwrap(), vec!["Hello".to_string(), "scanned".to_string()]);
    }
}
