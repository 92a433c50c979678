//! Detached CMS signatures in PDF signature fields

use crate::parser::PdfDocument;
use crate::stamp::fmt_num;
use crate::xobject::{embed_seal, seal_extent};
use crate::PdfContext;
use chrono::{DateTime, Utc};
use lopdf::{dictionary, Object, ObjectId, Stream, StringFormat};
use seal_crypto::SigningIdentity;
use seal_raster::ProcessedSeal;
use seal_types::{PlacementPoint, Result, SealError};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Bytes reserved for the DER signature; hex doubles this in the file.
const PLACEHOLDER_SIZE: usize = 8192;

/// Wide enough for any offset up to 10 GB.
const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

/// Who signed, where and why.
#[derive(Debug, Clone)]
pub struct SignatureDescriptor {
    pub name: String,
    pub location: String,
    pub reason: String,
    pub signing_time: DateTime<Utc>,
}

impl SignatureDescriptor {
    pub fn new(name: impl Into<String>, location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            reason: reason.into(),
            signing_time: Utc::now(),
        }
    }

    fn pdf_date(&self) -> String {
        self.signing_time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
    }
}

/// Where the signature widget goes. Without a seal the field is invisible.
#[derive(Debug, Clone)]
pub struct SignatureField {
    pub placement: PlacementPoint,
    pub seal: Option<ProcessedSeal>,
}

impl SignatureField {
    pub fn visible(placement: PlacementPoint, seal: ProcessedSeal) -> Self {
        Self {
            placement,
            seal: Some(seal),
        }
    }

    pub fn invisible(target: usize) -> Self {
        Self {
            placement: PlacementPoint {
                target,
                x: 0.0,
                y: 0.0,
            },
            seal: None,
        }
    }
}

/// PDF text string: plain bytes for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Field rectangle centered vertically on the placement, kept on the page.
fn widget_rect(x: f64, y: f64, width: f64, height: f64, page_height: f64) -> [f64; 4] {
    let bottom = (y - height / 2.0).max(0.0).min((page_height - height).max(0.0));
    [x, bottom, x + width, bottom + height]
}

/// Adds one signature field to a document and produces the signed bytes.
pub struct PdfSigner<'a> {
    doc: &'a mut PdfDocument,
    identity: &'a dyn SigningIdentity,
}

impl<'a> PdfSigner<'a> {
    pub fn new(doc: &'a mut PdfDocument, identity: &'a dyn SigningIdentity) -> Self {
        Self { doc, identity }
    }

    /// Sign the whole document and return the saved bytes.
    pub fn sign(&mut self, field: &SignatureField, descriptor: &SignatureDescriptor) -> Result<Vec<u8>> {
        let page_id = self.doc.page_id(field.placement.target)?;
        let sig_id = self.create_signature_dictionary(descriptor);
        let widget_id = self.create_widget(page_id, sig_id, field, descriptor)?;
        self.add_to_acroform(widget_id)?;
        self.add_to_page_annots(page_id, widget_id)?;

        let mut bytes = self.doc.save_to_bytes()?;
        let (contents_start, contents_end) = locate_placeholder(&bytes)?;
        let byte_range = [
            0,
            contents_start as i64,
            contents_end as i64,
            (bytes.len() - contents_end) as i64,
        ];
        // The range must be final before hashing, it is part of the signed bytes.
        replace_byte_range(&mut bytes, &byte_range)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes[..contents_start]);
        hasher.update(&bytes[contents_end..]);
        let digest = hasher.finalize();

        let cms = self.identity.detached_signed_data(&digest)?;
        let sig_hex = hex::encode_upper(&cms);
        let capacity = contents_end - contents_start - 2;
        if sig_hex.len() > capacity {
            return Err(SealError::crypto(format!(
                "signature too large: {} hex digits, room for {capacity}",
                sig_hex.len()
            )));
        }
        bytes[contents_start + 1..contents_start + 1 + sig_hex.len()].copy_from_slice(sig_hex.as_bytes());

        info!(
            page = field.placement.target + 1,
            visible = field.seal.is_some(),
            signature_bytes = cms.len(),
            "PDF signed"
        );
        Ok(bytes)
    }

    fn create_signature_dictionary(&mut self, descriptor: &SignatureDescriptor) -> ObjectId {
        let sig = dictionary! {
            "Type" => "Sig",
            "Filter" => "Adobe.PPKLite",
            "SubFilter" => "adbe.pkcs7.detached",
            "Name" => text_string(&descriptor.name),
            "Location" => text_string(&descriptor.location),
            "Reason" => text_string(&descriptor.reason),
            "M" => Object::String(descriptor.pdf_date().into_bytes(), StringFormat::Literal),
            "ByteRange" => vec![
                Object::Integer(0),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
            ],
            "Contents" => Object::String(vec![0; PLACEHOLDER_SIZE], StringFormat::Hexadecimal),
        };
        self.doc.doc.add_object(sig)
    }

    fn create_widget(
        &mut self,
        page_id: ObjectId,
        sig_id: ObjectId,
        field: &SignatureField,
        descriptor: &SignatureDescriptor,
    ) -> Result<ObjectId> {
        let mut widget = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
            "T" => text_string(&format!("Signature{}", self.signature_count() + 1)),
            "TU" => text_string(&descriptor.name),
            "V" => sig_id,
            "F" => 4,
            "P" => page_id,
        };

        match &field.seal {
            Some(seal) => {
                let target = field.placement.target;
                let (page_w, page_h) = self.doc.page_size(target)?;
                let point = PlacementPoint::checked(target, field.placement.x, field.placement.y, page_w, page_h)?;
                let (w, h) = seal_extent(seal)?;
                let rect = widget_rect(point.x, point.y, w, h, page_h);
                debug!(page = target + 1, ?rect, "visible signature field");

                let image_id = embed_seal(&mut self.doc.doc, seal)?;
                let appearance = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "FormType" => 1,
                        "BBox" => vec![0.into(), 0.into(), Object::Real(w as f32), Object::Real(h as f32)],
                        "Resources" => dictionary! {
                            "XObject" => dictionary! { "Seal" => image_id },
                        },
                    },
                    format!("q {} 0 0 {} 0 0 cm /Seal Do Q", fmt_num(w), fmt_num(h)).into_bytes(),
                );
                let appearance_id = self.doc.doc.add_object(appearance);
                widget.set("Rect", rect.iter().map(|v| Object::Real(*v as f32)).collect::<Vec<_>>());
                widget.set("AP", dictionary! { "N" => appearance_id });
            }
            None => {
                widget.set("Rect", vec![0.into(), 0.into(), 0.into(), 0.into()]);
            }
        }
        Ok(self.doc.doc.add_object(widget))
    }

    fn signature_count(&self) -> usize {
        self.doc
            .doc
            .objects
            .values()
            .filter_map(|obj| obj.as_dict().ok())
            .filter(|dict| matches!(dict.get(b"FT"), Ok(Object::Name(name)) if name == b"Sig"))
            .count()
    }

    fn add_to_acroform(&mut self, widget_id: ObjectId) -> Result<()> {
        let doc = &mut self.doc.doc;
        let existing = doc
            .catalog()
            .pdf_context("missing catalog")?
            .get(b"AcroForm")
            .ok()
            .cloned();

        let acroform_id = match existing {
            Some(Object::Reference(id)) => id,
            Some(Object::Dictionary(inline)) => doc.add_object(inline),
            _ => doc.add_object(dictionary! { "Fields" => Vec::<Object>::new() }),
        };
        doc.catalog_mut()
            .pdf_context("missing catalog")?
            .set("AcroForm", acroform_id);

        let fields = match doc.get_dictionary(acroform_id).pdf_context("AcroForm")?.get(b"Fields") {
            Ok(obj) => doc
                .dereference(obj)
                .ok()
                .and_then(|(_, obj)| obj.as_array().ok())
                .cloned()
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        let mut fields = fields;
        fields.push(Object::Reference(widget_id));

        let acroform = doc.get_dictionary_mut(acroform_id).pdf_context("AcroForm")?;
        acroform.set("Fields", fields);
        // SignaturesExist | AppendOnly
        acroform.set("SigFlags", 3);
        Ok(())
    }

    fn add_to_page_annots(&mut self, page_id: ObjectId, widget_id: ObjectId) -> Result<()> {
        let doc = &mut self.doc.doc;
        let mut annots = doc
            .get_dictionary(page_id)
            .pdf_context("page is not a dictionary")?
            .get(b"Annots")
            .ok()
            .and_then(|obj| doc.dereference(obj).ok())
            .and_then(|(_, obj)| obj.as_array().ok())
            .cloned()
            .unwrap_or_default();
        annots.push(Object::Reference(widget_id));
        doc.get_dictionary_mut(page_id)
            .pdf_context("page is not a dictionary")?
            .set("Annots", annots);
        Ok(())
    }
}

/// Byte offsets of the `<...>` Contents placeholder, delimiters included.
fn locate_placeholder(bytes: &[u8]) -> Result<(usize, usize)> {
    let mut needle = Vec::with_capacity(PLACEHOLDER_SIZE * 2 + 2);
    needle.push(b'<');
    needle.resize(PLACEHOLDER_SIZE * 2 + 1, b'0');
    needle.push(b'>');
    let start = find_last(bytes, &needle)
        .ok_or_else(|| SealError::format("signature placeholder not found in saved PDF"))?;
    Ok((start, start + needle.len()))
}

fn replace_byte_range(bytes: &mut [u8], range: &[i64; 4]) -> Result<()> {
    let marker = find_last(bytes, b"/ByteRange")
        .ok_or_else(|| SealError::format("ByteRange placeholder not found in saved PDF"))?;
    let open = marker
        + bytes[marker..]
            .iter()
            .position(|&b| b == b'[')
            .ok_or_else(|| SealError::format("malformed ByteRange placeholder"))?;
    let close = open
        + bytes[open..]
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| SealError::format("malformed ByteRange placeholder"))?;

    let value = format!("[{} {} {} {}]", range[0], range[1], range[2], range[3]);
    let slot = &mut bytes[open..=close];
    if value.len() > slot.len() {
        return Err(SealError::format("ByteRange does not fit its placeholder"));
    }
    slot.fill(b' ');
    slot[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{blank_pdf, text_pdf};
    use crate::verify::verify_pdf_signatures;
    use image::{DynamicImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use seal_crypto::cert::generate_self_signed_keystore;
    use seal_crypto::KeystoreIdentity;
    use seal_raster::RasterFormat;
    use seal_types::ErrorKind;

    fn identity() -> KeystoreIdentity {
        let p12 = generate_self_signed_keystore("PDF Test Signer", "secret").unwrap();
        KeystoreIdentity::from_pkcs12(&p12, "secret").unwrap()
    }

    fn seal() -> ProcessedSeal {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 20, Rgba([200, 0, 0, 255])));
        ProcessedSeal {
            bytes: seal_raster::encode_png(&img).unwrap(),
            width: 30,
            height: 20,
            format: RasterFormat::Png,
        }
    }

    fn descriptor() -> SignatureDescriptor {
        SignatureDescriptor::new("Seal Service", "Zürich", "Is used to protect file from being modified")
    }

    #[test]
    fn test_visible_signature_round_trip() {
        let mut pdf = PdfDocument::from_bytes(&text_pdf(&[&[("Hello", 72, 700)], &[]])).unwrap();
        let id = identity();
        let field = SignatureField::visible(PlacementPoint { target: 1, x: 100.0, y: 200.0 }, seal());
        let signed = PdfSigner::new(&mut pdf, &id).sign(&field, &descriptor()).unwrap();

        let reports = verify_pdf_signatures(&signed).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].covers_whole_file);
        assert_eq!(reports[0].signer.common_name.as_deref(), Some("PDF Test Signer"));

        let reloaded = PdfDocument::from_bytes(&signed).unwrap();
        assert_eq!(reloaded.page_count(), 2);
    }

    #[test]
    fn test_invisible_signature_round_trip() {
        let mut pdf = PdfDocument::from_bytes(&blank_pdf(1)).unwrap();
        let id = identity();
        let signed = PdfSigner::new(&mut pdf, &id)
            .sign(&SignatureField::invisible(0), &descriptor())
            .unwrap();
        assert_eq!(verify_pdf_signatures(&signed).unwrap().len(), 1);
    }

    #[test]
    fn test_tampering_is_detected() {
        let mut pdf = PdfDocument::from_bytes(&text_pdf(&[&[("Amount 100", 72, 700)]])).unwrap();
        let id = identity();
        let mut signed = PdfSigner::new(&mut pdf, &id)
            .sign(&SignatureField::invisible(0), &descriptor())
            .unwrap();
        let pos = find_last(&signed, b"Amount 100").unwrap();
        signed[pos + 7] = b'9';
        assert_eq!(verify_pdf_signatures(&signed).unwrap_err().kind(), ErrorKind::Crypto);
    }

    #[test]
    fn test_widget_rect_centered_and_clamped() {
        let mut pdf = PdfDocument::from_bytes(&blank_pdf(1)).unwrap();
        let id = identity();
        let field = SignatureField::visible(PlacementPoint { target: 0, x: 50.0, y: 785.0 }, seal());
        let signed = PdfSigner::new(&mut pdf, &id).sign(&field, &descriptor()).unwrap();

        let doc = PdfDocument::from_bytes(&signed).unwrap();
        let page = doc.inner().get_dictionary(doc.page_id(0).unwrap()).unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        let widget = doc.inner().get_dictionary(annots[0].as_reference().unwrap()).unwrap();
        let rect: Vec<f64> = widget
            .get(b"Rect")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| f64::from(o.as_float().unwrap()))
            .collect();
        assert_eq!(rect, vec![50.0, 772.0, 80.0, 792.0]);
    }

    #[test]
    fn test_out_of_bounds_field() {
        let mut pdf = PdfDocument::from_bytes(&blank_pdf(1)).unwrap();
        let id = identity();
        let field = SignatureField::visible(PlacementPoint { target: 0, x: 900.0, y: 10.0 }, seal());
        let err = PdfSigner::new(&mut pdf, &id).sign(&field, &descriptor()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Geometry);
    }

    #[test]
    fn test_widget_rect() {
        assert_eq!(widget_rect(10.0, 100.0, 30.0, 20.0, 792.0), [10.0, 90.0, 40.0, 110.0]);
        assert_eq!(widget_rect(10.0, 2.0, 30.0, 20.0, 792.0), [10.0, 0.0, 40.0, 20.0]);
    }

    #[test]
    fn test_text_string_encodings() {
        assert_eq!(text_string("abc"), Object::String(b"abc".to_vec(), StringFormat::Literal));
        match text_string("é") {
            Object::String(bytes, StringFormat::Hexadecimal) => assert_eq!(bytes, vec![0xFE, 0xFF, 0x00, 0xE9]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_replace_byte_range_pads() {
        let mut bytes = b"/ByteRange [0 9999999999 9999999999 9999999999] rest".to_vec();
        replace_byte_range(&mut bytes, &[0, 10, 20, 30]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("/ByteRange [0 10 20 30]"));
        assert!(text.ends_with(" rest"));
        assert_eq!(text.len(), "/ByteRange [0 9999999999 9999999999 9999999999] rest".len());
    }
}
