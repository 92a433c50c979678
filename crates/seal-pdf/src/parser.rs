//! PDF loading and page geometry on top of lopdf

use crate::PdfContext;
use lopdf::{Dictionary, Document, Object, ObjectId};
use seal_types::{Result, SealError};

/// Page tree nesting we are willing to follow for inherited attributes.
const MAX_INHERIT_DEPTH: usize = 32;

/// Fallback when neither the page nor its ancestors carry a MediaBox (A4).
const DEFAULT_PAGE_SIZE: (f64, f64) = (595.0, 842.0);

/// A loaded PDF with zero-based page access.
pub struct PdfDocument {
    pub(crate) doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !crate::is_pdf(bytes) {
            return Err(SealError::format("missing %PDF header"));
        }
        let doc = Document::load_mem(bytes).pdf_context("PDF parse error")?;
        if doc.is_encrypted() {
            return Err(SealError::format("encrypted PDFs are not supported"));
        }
        Ok(Self { doc })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Object id of the page at zero-based `index`
    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        let number = u32::try_from(index + 1)
            .map_err(|_| SealError::Geometry(format!("page {} does not exist", index + 1)))?;
        self.doc.get_pages().get(&number).copied().ok_or_else(|| {
            SealError::Geometry(format!(
                "page {} does not exist, document has {} pages",
                index + 1,
                self.page_count()
            ))
        })
    }

    /// Width and height in points of the page at zero-based `index`
    pub fn page_size(&self, index: usize) -> Result<(f64, f64)> {
        let page_id = self.page_id(index)?;
        let page = self.doc.get_dictionary(page_id).pdf_context("page is not a dictionary")?;
        match self.inherited(page, b"MediaBox") {
            Some(media_box) => {
                let [x1, y1, x2, y2] = self.parse_rect(media_box)?;
                Ok(((x2 - x1).abs(), (y2 - y1).abs()))
            }
            None => Ok(DEFAULT_PAGE_SIZE),
        }
    }

    /// Sizes of every page, in order
    pub fn page_sizes(&self) -> Result<Vec<(f64, f64)>> {
        (0..self.page_count()).map(|i| self.page_size(i)).collect()
    }

    /// Look up `key` on the page, then up the Parent chain.
    pub(crate) fn inherited<'a>(&'a self, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut node = page;
        for _ in 0..MAX_INHERIT_DEPTH {
            if let Ok(value) = node.get(key) {
                return Some(value);
            }
            let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
            node = self.doc.get_dictionary(parent).ok()?;
        }
        None
    }

    /// Parse a PDF rectangle array into [x1, y1, x2, y2]
    fn parse_rect(&self, obj: &Object) -> Result<[f64; 4]> {
        let (_, obj) = self.doc.dereference(obj).pdf_context("unresolvable rectangle")?;
        let arr = obj
            .as_array()
            .map_err(|_| SealError::format("MediaBox is not an array"))?;
        if arr.len() != 4 {
            return Err(SealError::format(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }
        let mut values = [0.0f64; 4];
        for (value, obj) in values.iter_mut().zip(arr) {
            *value = self.number(obj)?;
        }
        Ok(values)
    }

    pub(crate) fn number(&self, obj: &Object) -> Result<f64> {
        let (_, obj) = self.doc.dereference(obj).pdf_context("unresolvable number")?;
        match obj {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(f64::from(*r)),
            _ => Err(SealError::format("expected a number")),
        }
    }

    pub fn inner(&self) -> &Document {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Serialize the current state of the document
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| SealError::format(format!("failed to save PDF: {e}")))?;
        Ok(buffer)
    }
}
