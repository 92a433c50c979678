//! PDF side of seal placement
//!
//! - Page geometry and loading ([`PdfDocument`])
//! - A generic glyph-run walker over the text layer, with a keyword visitor
//! - Stamping seal images into page content
//! - Visible signature fields carrying a detached CMS signature, and their
//!   verification
//! - Rasterizing scanned pages for the OCR fallback

pub mod keyword;
pub mod parser;
pub mod raster;
pub mod signer;
pub mod stamp;
pub mod text;
pub mod verify;
pub mod xobject;

pub use keyword::{find_keyword, KeywordFinder};
pub use parser::PdfDocument;
pub use raster::{EmbeddedImageRasterizer, PageRasterizer};
pub use signer::{PdfSigner, SignatureDescriptor, SignatureField};
pub use stamp::stamp_seal;
pub use text::{walk_text, Glyph, GlyphRun, GlyphRunVisitor};
pub use verify::{verify_pdf_signatures, SignatureReport};

use seal_types::{Result, SealError};

/// Attach context to lopdf failures, mapping them to `Format`.
pub(crate) trait PdfContext<T> {
    fn pdf_context(self, what: &str) -> Result<T>;
}

impl<T> PdfContext<T> for lopdf::Result<T> {
    fn pdf_context(self, what: &str) -> Result<T> {
        self.map_err(|e| SealError::format(format!("{what}: {e}")))
    }
}

/// `true` if the bytes start like a PDF file.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}
