//! Drawing seal images into page content

use crate::parser::PdfDocument;
use crate::xobject::{embed_seal, seal_extent};
use crate::PdfContext;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use seal_raster::ProcessedSeal;
use seal_types::{PlacementPoint, Result};
use tracing::debug;

/// Format a coordinate for a content stream.
pub(crate) fn fmt_num(value: f64) -> String {
    let s = format!("{value:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn resolved_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    doc.dereference(obj)
        .ok()
        .and_then(|(_, obj)| obj.as_dict().ok())
        .cloned()
}

/// Page-owned copy of the page's effective Resources.
fn page_resources(pdf: &PdfDocument, page_id: ObjectId) -> Result<Dictionary> {
    let page = pdf.doc.get_dictionary(page_id).pdf_context("page is not a dictionary")?;
    let mut resources = pdf
        .inherited(page, b"Resources")
        .and_then(|obj| resolved_dict(&pdf.doc, obj))
        .unwrap_or_default();

    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolved_dict(&pdf.doc, obj))
        .unwrap_or_default();
    resources.set("XObject", Object::Dictionary(xobjects));
    Ok(resources)
}

/// Register `image_id` under a fresh name in the page's XObject resources.
pub(crate) fn register_xobject(
    pdf: &mut PdfDocument,
    page_id: ObjectId,
    image_id: ObjectId,
) -> Result<String> {
    let mut resources = page_resources(pdf, page_id)?;
    let xobjects = resources
        .get_mut(b"XObject")
        .and_then(Object::as_dict_mut)
        .pdf_context("XObject resources")?;

    let name = (1..)
        .map(|n| format!("Seal{n}"))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| "Seal".to_string());
    xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));

    pdf.doc
        .get_dictionary_mut(page_id)
        .pdf_context("page is not a dictionary")?
        .set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Append `ops` to the page, isolating the existing content in its own
/// graphics state so it cannot leak a transform into the new operations.
pub(crate) fn append_isolated(pdf: &mut PdfDocument, page_id: ObjectId, ops: String) -> Result<()> {
    let existing = pdf.doc.get_page_contents(page_id);
    let open = pdf.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let draw = pdf
        .doc
        .add_object(Stream::new(Dictionary::new(), format!("\nQ\n{ops}\n").into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(existing.into_iter().map(Object::Reference));
    contents.push(Object::Reference(draw));
    pdf.doc
        .get_dictionary_mut(page_id)
        .pdf_context("page is not a dictionary")?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Draw `seal` with its lower-left corner at the placement point.
///
/// The image is sized to the seal's pixel dimensions, one pixel per point;
/// scaling has already happened during preprocessing. Existing page
/// content is left intact underneath.
pub fn stamp_seal(pdf: &mut PdfDocument, seal: &ProcessedSeal, placement: &PlacementPoint) -> Result<()> {
    let page_id = pdf.page_id(placement.target)?;
    let (width, height) = pdf.page_size(placement.target)?;
    let point = PlacementPoint::checked(placement.target, placement.x, placement.y, width, height)?;
    let (seal_w, seal_h) = seal_extent(seal)?;

    let image_id = embed_seal(&mut pdf.doc, seal)?;
    let name = register_xobject(pdf, page_id, image_id)?;
    let ops = format!(
        "q {} 0 0 {} {} {} cm /{} Do Q",
        fmt_num(seal_w),
        fmt_num(seal_h),
        fmt_num(point.x),
        fmt_num(point.y),
        name
    );
    debug!(page = point.target + 1, x = point.x, y = point.y, %name, "stamping seal");
    append_isolated(pdf, page_id, ops)
}
