//! Generic walk over the text layer.
//!
//! pdf-extract drives an [`OutputDev`] glyph by glyph; [`TextWalker`] groups
//! those glyphs into runs (one per text positioning operation or baseline)
//! and hands each finished run to a [`GlyphRunVisitor`]. Searches are
//! visitors, so nothing has to extend pdf-extract's own output devices.

use crate::parser::PdfDocument;
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};
use seal_types::{Result, SealError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

/// One rendered glyph with its origin in page space (bottom-left, points).
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

/// Consecutive glyphs drawn on one baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    /// Zero-based page index
    pub page: usize,
    pub glyphs: Vec<Glyph>,
}

impl GlyphRun {
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.text.as_str()).collect()
    }

}

/// Receives text runs in document order.
pub trait GlyphRunVisitor {
    fn begin_page(&mut self, _page: usize) {}

    fn visit_run(&mut self, run: &GlyphRun);
}

struct TextWalker<'v> {
    visitor: &'v mut dyn GlyphRunVisitor,
    page: usize,
    glyphs: Vec<Glyph>,
}

impl TextWalker<'_> {
    fn flush(&mut self) {
        if self.glyphs.is_empty() {
            return;
        }
        let run = GlyphRun {
            page: self.page,
            glyphs: std::mem::take(&mut self.glyphs),
        };
        self.visitor.visit_run(&run);
    }
}

impl OutputDev for TextWalker<'_> {
    fn begin_page(
        &mut self,
        page_num: u32,
        _media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> std::result::Result<(), OutputError> {
        self.flush();
        self.page = page_num.saturating_sub(1) as usize;
        self.visitor.begin_page(self.page);
        Ok(())
    }

    fn end_page(&mut self) -> std::result::Result<(), OutputError> {
        self.flush();
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        _width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> std::result::Result<(), OutputError> {
        let (x, y) = (trm.m31, trm.m32);
        // A jump off the baseline without a positioning operator starts a new run.
        let scale = (trm.m22.abs() * font_size).max(1.0);
        if let Some(last) = self.glyphs.last() {
            if (last.y - y).abs() > scale * 0.5 {
                self.flush();
            }
        }
        self.glyphs.push(Glyph {
            text: char.to_string(),
            x,
            y,
        });
        Ok(())
    }

    fn begin_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> std::result::Result<(), OutputError> {
        self.flush();
        Ok(())
    }
}

/// Feed every text run of `pdf` to `visitor`, page by page.
///
/// pdf-extract asserts on malformed content streams; such panics surface as
/// a `Format` error instead of unwinding through the caller.
pub fn walk_text(pdf: &PdfDocument, visitor: &mut dyn GlyphRunVisitor) -> Result<()> {
    let mut walker = TextWalker {
        visitor,
        page: 0,
        glyphs: Vec::new(),
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::output_doc(pdf.inner(), &mut walker)
    }));
    match outcome {
        Ok(Ok(())) => {
            walker.flush();
            Ok(())
        }
        Ok(Err(e)) => Err(SealError::format(format!("text extraction failed: {e:?}"))),
        Err(_) => {
            debug!("text extraction panicked");
            Err(SealError::format("text layer could not be interpreted"))
        }
    }
}

/// Collects runs per page; used for plain text extraction.
#[derive(Default)]
pub struct RunCollector {
    pub runs: Vec<GlyphRun>,
}

impl GlyphRunVisitor for RunCollector {
    fn visit_run(&mut self, run: &GlyphRun) {
        self.runs.push(run.clone());
    }
}

/// Text of every page, runs joined by newlines.
pub fn page_texts(pdf: &PdfDocument) -> Result<Vec<String>> {
    let mut collector = RunCollector::default();
    walk_text(pdf, &mut collector)?;
    let mut pages = vec![String::new(); pdf.page_count()];
    for run in collector.runs {
        if let Some(page) = pages.get_mut(run.page) {
            if !page.is_empty() {
                page.push('\n');
            }
            page.push_str(&run.text());
        }
    }
    Ok(pages)
}
