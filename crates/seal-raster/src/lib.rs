//! Raster side of seal placement
//!
//! Everything that touches decoded pixels lives here:
//! - Seal preprocessing (background matting and proportional scaling)
//! - Compositing a seal onto a raster target and stacking several targets
//! - Signatures embedded in JPEG metadata
//! - OCR geometry: rotated box cropping, line ordering and a pooled engine

pub mod compose;
pub mod format;
pub mod matting;
pub mod merge;
pub mod metadata;
pub mod ocr;
pub mod preprocess;
pub mod scale;

pub use compose::{composite, target_dimensions, vertical_anchor};
pub use format::{decode, encode_jpeg, encode_png, RasterFormat};
pub use matting::matte;
pub use merge::vertical_stack;
pub use metadata::{extract_signature, sign_image, verify_image_signature};
pub use preprocess::{ProcessedSeal, SealPreprocessor};
pub use scale::{scale_to_area, scaled_dimensions};
