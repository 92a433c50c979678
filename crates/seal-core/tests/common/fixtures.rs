//! Shared builders for the seal-core integration tests.

#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageOutputFormat, Rgb, RgbImage};
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};
use seal_core::{KeywordLocator, MemoryFileStore, SealConfig, SealService};
use seal_crypto::cert::generate_self_signed_keystore;
use seal_crypto::{IdentityProvider, KeystoreSource, DEFAULT_KEYSTORE_PASSWORD};
use seal_pdf::PdfDocument;
use seal_raster::ocr::{OcrEngine, OcrPipeline, OcrPool, Quad, TextDetector, TextRecognizer};
use seal_types::{InputRef, Multiplicity, SignMode, SignRequest};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Letter pages, each showing its lines of `(text, x, y)` in Helvetica 12.
pub fn invoice_pdf(pages: &[&[(&str, i64, i64)]]) -> Vec<u8> {
    let pages: Vec<_> = pages.iter().map(|lines| ((612, 792), *lines)).collect();
    build_pdf(&pages)
}

/// Blank pages of the given `(width, height)` in points.
pub fn sized_pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
    let pages: Vec<_> = sizes.iter().map(|&size| (size, &[][..])).collect();
    build_pdf(&pages)
}

fn build_pdf(pages: &[((i64, i64), &[(&str, i64, i64)])]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for &((width, height), lines) in pages {
        let content: String = lines
            .iter()
            .map(|(text, x, y)| format!("BT /F1 12 Tf {x} {y} Td ({text}) Tj ET\n"))
            .collect();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save fixture PDF");
    buffer
}

pub fn blank_pdf(num_pages: usize) -> Vec<u8> {
    let pages: Vec<&[(&str, i64, i64)]> = vec![&[]; num_pages];
    invoice_pdf(&pages)
}

/// Three pages, three `TOTAL` lines: two on page 1, one on page 3.
pub fn three_totals_pdf() -> Vec<u8> {
    invoice_pdf(&[
        &[("Invoice 1", 72, 720), ("TOTAL 10.00", 300, 400), ("TOTAL 12.00", 300, 200)],
        &[("Terms", 72, 720)],
        &[("TOTAL 22.00", 320, 150)],
    ])
}

/// Number of image draws on each page.
pub fn draws_per_page(bytes: &[u8]) -> Vec<usize> {
    let pdf = PdfDocument::from_bytes(bytes).expect("reload PDF");
    (0..pdf.page_count())
        .map(|page| {
            let page_id = pdf.page_id(page).expect("page id");
            let data = pdf.inner().get_page_content(page_id).expect("page content");
            Content::decode(&data)
                .expect("decode content")
                .operations
                .iter()
                .filter(|op| op.operator == "Do")
                .count()
        })
        .collect()
}

/// `(width, height)` of every image drawn on each page, from its `cm`.
pub fn seal_extents_per_page(bytes: &[u8]) -> Vec<Vec<(f64, f64)>> {
    let pdf = PdfDocument::from_bytes(bytes).expect("reload PDF");
    (0..pdf.page_count())
        .map(|page| {
            let page_id = pdf.page_id(page).expect("page id");
            let data = pdf.inner().get_page_content(page_id).expect("page content");
            let ops = Content::decode(&data).expect("decode content").operations;
            ops.windows(2)
                .filter(|pair| pair[0].operator == "cm" && pair[1].operator == "Do")
                .map(|pair| {
                    let number = |i: usize| f64::from(pair[0].operands[i].as_float().expect("cm operand"));
                    (number(0), number(3))
                })
                .collect()
        })
        .collect()
}

fn encode(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode fixture image");
    out.into_inner()
}

/// Off-white receipt scan.
pub fn receipt_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([245, 243, 238]));
    encode(DynamicImage::ImageRgb8(img), ImageOutputFormat::Jpeg(90))
}

pub fn receipt_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([250, 250, 250]));
    encode(DynamicImage::ImageRgb8(img), ImageOutputFormat::Png)
}

/// Red ring on a white background.
pub fn red_stamp_png(size: u32) -> Vec<u8> {
    let center = size as f32 / 2.0;
    let img = RgbImage::from_fn(size, size, |x, y| {
        let d = ((x as f32 - center).powi(2) + (y as f32 - center).powi(2)).sqrt();
        if d < center * 0.9 && d > center * 0.6 {
            Rgb([200, 20, 20])
        } else {
            Rgb([255, 255, 255])
        }
    });
    encode(DynamicImage::ImageRgb8(img), ImageOutputFormat::Png)
}

/// Bounding box `(left, top, right, bottom)` of seal-red pixels, if any.
pub fn red_bounds(bytes: &[u8]) -> Option<(u32, u32, u32, u32)> {
    let image = seal_raster::decode(bytes).expect("decode output").to_rgb8();
    image
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 150 && p[1] < 90 && p[2] < 90)
        .fold(None, |bounds, (x, y, _)| match bounds {
            None => Some((x, y, x, y)),
            Some((l, t, r, b)) => Some((l.min(x), t.min(y), r.max(x), b.max(y))),
        })
}

// ============================================================================
// OCR fakes
// ============================================================================

struct FixedDetector(Vec<Quad>);

impl TextDetector for FixedDetector {
    fn detect(&mut self, _image: &GrayImage) -> seal_types::Result<Vec<Quad>> {
        Ok(self.0.clone())
    }
}

/// Different boxes per image, keyed by the image's pixel size.
struct PerImageDetector(HashMap<(u32, u32), Vec<Quad>>);

impl TextDetector for PerImageDetector {
    fn detect(&mut self, image: &GrayImage) -> seal_types::Result<Vec<Quad>> {
        Ok(self.0.get(&image.dimensions()).cloned().unwrap_or_default())
    }
}

struct SizeRecognizer(HashMap<(u32, u32), String>);

impl TextRecognizer for SizeRecognizer {
    fn recognize(&mut self, crop: &GrayImage) -> seal_types::Result<String> {
        Ok(self.0.get(&crop.dimensions()).cloned().unwrap_or_default())
    }
}

/// Pipeline reporting the same `(text, x, y, w, h)` boxes on every image.
pub fn scripted_ocr(words: &[(&str, f32, f32, f32, f32)]) -> Arc<OcrPipeline> {
    let quads = words
        .iter()
        .map(|&(_, x, y, w, h)| Quad::axis_aligned(x, y, w, h))
        .collect();
    let texts = words
        .iter()
        .map(|&(text, _, _, w, h)| ((w as u32, h as u32), text.to_string()))
        .collect();
    let engine = OcrEngine::new(FixedDetector(quads), SizeRecognizer(texts));
    Arc::new(OcrPipeline::new(
        OcrPool::new(vec![engine], Duration::from_secs(5)),
        20.0,
    ))
}

/// Pipeline reporting `(text, x, y, w, h)` boxes only on images of the
/// matching pixel size; other images show no text at all.
pub fn scripted_ocr_per_image(images: Vec<((u32, u32), Vec<(&str, f32, f32, f32, f32)>)>) -> Arc<OcrPipeline> {
    let mut quads = HashMap::new();
    let mut texts = HashMap::new();
    for (size, words) in images {
        for (text, x, y, w, h) in words {
            quads
                .entry(size)
                .or_insert_with(Vec::new)
                .push(Quad::axis_aligned(x, y, w, h));
            texts.insert((w as u32, h as u32), text.to_string());
        }
    }
    let engine = OcrEngine::new(PerImageDetector(quads), SizeRecognizer(texts));
    Arc::new(OcrPipeline::new(
        OcrPool::new(vec![engine], Duration::from_secs(5)),
        20.0,
    ))
}

// ============================================================================
// Service and requests
// ============================================================================

pub fn keystore(common_name: &str) -> Vec<u8> {
    generate_self_signed_keystore(common_name, DEFAULT_KEYSTORE_PASSWORD).expect("generate keystore")
}

pub fn service_with(store: Arc<MemoryFileStore>, keystore_bytes: Vec<u8>) -> SealService {
    SealService::new(SealConfig::default(), store).with_identities(IdentityProvider::new(
        KeystoreSource::Bytes(keystore_bytes),
        DEFAULT_KEYSTORE_PASSWORD,
    ))
}

pub fn ocr_service(store: Arc<MemoryFileStore>, keystore_bytes: Vec<u8>, ocr: Arc<OcrPipeline>) -> SealService {
    service_with(store, keystore_bytes).with_locator(KeywordLocator::with_ocr(ocr, 300))
}

pub fn keyword_request(keyword: &str, multiplicity: Multiplicity, documents: Vec<InputRef>) -> SignRequest {
    SignRequest {
        signer: Some("Dana Reviewer".into()),
        mode: SignMode::Keyword,
        position: None,
        keyword: Some(keyword.into()),
        multiplicity,
        merge: false,
        digital_signature: false,
        certificate: None,
        seal: InputRef::inline(red_stamp_png(240), "stamp.png"),
        documents,
    }
}

pub fn position_request(position: &str, documents: Vec<InputRef>) -> SignRequest {
    SignRequest {
        mode: SignMode::Position,
        position: Some(position.into()),
        keyword: None,
        ..keyword_request("unused", Multiplicity::Last, documents)
    }
}
