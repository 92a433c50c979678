//! Two-stage OCR: a detector proposes rotated boxes, a recognizer reads each
//! upright crop. The models are external; only their geometry is handled here.

use super::geometry::{crop_upright, Quad};
use super::lines::sort_into_lines;
use image::GrayImage;
use seal_types::{Result, SealError, TextLocation};
use tracing::{debug, trace};

/// Text region detection model.
pub trait TextDetector: Send {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Quad>>;
}

/// Text recognition model for a single upright line crop.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, crop: &GrayImage) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub quad: Quad,
    pub text: String,
}

impl AsRef<Quad> for RecognizedText {
    fn as_ref(&self) -> &Quad {
        &self.quad
    }
}

/// One detector/recognizer pair. Inference is not reentrant, hence `&mut`.
pub struct OcrEngine {
    detector: Box<dyn TextDetector>,
    recognizer: Box<dyn TextRecognizer>,
}

impl OcrEngine {
    pub fn new(
        detector: impl TextDetector + 'static,
        recognizer: impl TextRecognizer + 'static,
    ) -> Self {
        Self {
            detector: Box::new(detector),
            recognizer: Box::new(recognizer),
        }
    }

    /// Detect and read every text region.
    ///
    /// Fails with `NotFound` when detection finds no text at all.
    pub fn recognize(&mut self, image: &GrayImage) -> Result<Vec<RecognizedText>> {
        let boxes = self.detector.detect(image)?;
        if boxes.is_empty() {
            return Err(SealError::NotFound("no text detected in image".into()));
        }
        debug!(boxes = boxes.len(), "text regions detected");

        let mut texts = Vec::with_capacity(boxes.len());
        for quad in boxes {
            let Some(crop) = crop_upright(image, &quad) else {
                trace!(?quad, "skipping degenerate box");
                continue;
            };
            let text = self.recognizer.recognize(&crop)?;
            texts.push(RecognizedText {
                quad,
                text: text.trim().to_string(),
            });
        }
        Ok(texts)
    }

    /// Boxes reading exactly `keyword`, anchored at their third corner and
    /// normalized to bottom-left against the image height.
    pub fn find_keyword(
        &mut self,
        image: &GrayImage,
        keyword: &str,
        target: usize,
    ) -> Result<Vec<TextLocation>> {
        let height = f64::from(image.height());
        let hits = self
            .recognize(image)?
            .into_iter()
            .filter(|found| found.text == keyword)
            .map(|found| {
                let (x, y) = found.quad.anchor();
                TextLocation::top_left(target, f64::from(x), f64::from(y)).to_bottom_left(height)
            })
            .collect::<Vec<_>>();
        debug!(target, hits = hits.len(), "keyword search by OCR");
        Ok(hits)
    }

    /// Full text in reading order, one string per line.
    pub fn extract_lines(&mut self, image: &GrayImage, line_threshold: f32) -> Result<Vec<String>> {
        let texts = self.recognize(image)?;
        Ok(sort_into_lines(texts, line_threshold)
            .into_iter()
            .map(|line| {
                line.into_iter()
                    .map(|t| t.text)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect())
    }
}
