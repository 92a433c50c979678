use crate::parser::PdfDocument;
use crate::text::{walk_text, GlyphRun, GlyphRunVisitor};
use seal_types::{Result, TextLocation};
use tracing::debug;

/// Records one hit for every run that contains `keyword`, anchored at the
/// first glyph of the run that can begin the keyword. That glyph may come
/// before the actual occurrence ("Sum SUBTOTAL" anchors on the "S" of "Sum").
pub struct KeywordFinder<'k> {
    keyword: &'k str,
    hits: Vec<TextLocation>,
}

impl<'k> KeywordFinder<'k> {
    pub fn new(keyword: &'k str) -> Self {
        Self {
            keyword,
            hits: Vec::new(),
        }
    }

    pub fn into_hits(self) -> Vec<TextLocation> {
        self.hits
    }
}

impl GlyphRunVisitor for KeywordFinder<'_> {
    fn visit_run(&mut self, run: &GlyphRun) {
        if self.keyword.is_empty() {
            return;
        }
        if !run.text().contains(self.keyword) {
            return;
        }
        let start = run
            .glyphs
            .iter()
            .find(|g| !g.text.is_empty() && self.keyword.starts_with(g.text.as_str()));
        if let Some(glyph) = start {
            self.hits
                .push(TextLocation::bottom_left(run.page, glyph.x, glyph.y));
        }
    }
}

/// Every occurrence of `keyword` in the text layer, in document order.
pub fn find_keyword(pdf: &PdfDocument, keyword: &str) -> Result<Vec<TextLocation>> {
    let mut finder = KeywordFinder::new(keyword);
    walk_text(pdf, &mut finder)?;
    let hits = finder.into_hits();
    debug!(keyword, hits = hits.len(), "text layer keyword search");
    Ok(hits)
}
