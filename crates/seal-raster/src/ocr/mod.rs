//! OCR geometry and engine management

pub mod engine;
pub mod geometry;
pub mod lines;
pub mod pool;

pub use engine::{OcrEngine, RecognizedText, TextDetector, TextRecognizer};
pub use geometry::{crop_upright, Quad};
pub use lines::{sort_into_lines, DEFAULT_LINE_THRESHOLD};
pub use pool::{OcrPipeline, OcrPool};
