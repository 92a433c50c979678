//! Page images for the OCR fallback
//!
//! Scanned PDFs are usually one full-page image per page. Decoding that
//! image and resampling it to the page size gives OCR the same picture a
//! renderer would, without a rendering engine.

use crate::parser::PdfDocument;
use flate2::read::ZlibDecoder;
use image::{imageops, GrayImage, Luma};
use lopdf::{Dictionary, Document, Object, Stream};
use seal_types::Result;
use std::io::Read;
use tracing::debug;

/// Longest side we will produce, in pixels.
const MAX_RASTER_SIDE: f64 = 10_000.0;

/// Turns a PDF page into a grayscale image for text detection.
pub trait PageRasterizer: Send + Sync {
    /// `Ok(None)` when the page has nothing this rasterizer can draw.
    fn rasterize(&self, pdf: &PdfDocument, page: usize, dpi: u32) -> Result<Option<GrayImage>>;
}

/// Uses the largest image XObject on the page as the page raster.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedImageRasterizer;

impl PageRasterizer for EmbeddedImageRasterizer {
    fn rasterize(&self, pdf: &PdfDocument, page: usize, dpi: u32) -> Result<Option<GrayImage>> {
        let (page_w, page_h) = pdf.page_size(page)?;
        let Some(stream) = largest_image(pdf, page)? else {
            debug!(page = page + 1, "no image on page");
            return Ok(None);
        };
        let Some(image) = decode_image(&pdf.doc, stream) else {
            debug!(page = page + 1, "page image uses an unsupported encoding");
            return Ok(None);
        };

        let scale = f64::from(dpi.max(1)) / 72.0;
        let cap = MAX_RASTER_SIDE / (page_w.max(page_h) * scale).max(1.0);
        let scale = scale * cap.min(1.0);
        let width = ((page_w * scale).round() as u32).max(1);
        let height = ((page_h * scale).round() as u32).max(1);
        debug!(page = page + 1, width, height, "rasterized page image");
        Ok(Some(imageops::resize(&image, width, height, imageops::FilterType::Triangle)))
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    doc.dereference(obj).ok().map(|(_, obj)| obj)
}

fn largest_image(pdf: &PdfDocument, page: usize) -> Result<Option<&Stream>> {
    let page_id = pdf.page_id(page)?;
    let Ok(page_dict) = pdf.doc.get_dictionary(page_id) else {
        return Ok(None);
    };
    let xobjects = pdf
        .inherited(page_dict, b"Resources")
        .and_then(|obj| resolve(&pdf.doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|obj| resolve(&pdf.doc, obj))
        .and_then(|obj| obj.as_dict().ok());
    let Some(xobjects) = xobjects else {
        return Ok(None);
    };

    let largest = xobjects
        .iter()
        .filter_map(|(_, obj)| resolve(&pdf.doc, obj)?.as_stream().ok())
        .filter(|stream| matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
        .max_by_key(|stream| dimension(&stream.dict, b"Width") * dimension(&stream.dict, b"Height"));
    Ok(largest)
}

fn dimension(dict: &Dictionary, key: &[u8]) -> u64 {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(0)
}

/// The single filter name, `None` for unfiltered data.
fn filter(dict: &Dictionary) -> std::result::Result<Option<&[u8]>, ()> {
    match dict.get(b"Filter") {
        Err(_) => Ok(None),
        Ok(Object::Name(name)) => Ok(Some(name.as_slice())),
        Ok(Object::Array(items)) if items.is_empty() => Ok(None),
        Ok(Object::Array(items)) if items.len() == 1 => items[0].as_name().map(Some).map_err(|_| ()),
        Ok(_) => Err(()),
    }
}

fn components(doc: &Document, dict: &Dictionary) -> Option<usize> {
    let color_space = resolve(doc, dict.get(b"ColorSpace").ok()?)?;
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(items) if items.first()?.as_name().ok()? == b"ICCBased" => {
            let profile = resolve(doc, items.get(1)?)?.as_stream().ok()?;
            usize::try_from(profile.dict.get(b"N").ok()?.as_i64().ok()?)
                .ok()
                .filter(|&n| n > 0)
        }
        _ => None,
    }
}

fn decode_image(doc: &Document, stream: &Stream) -> Option<GrayImage> {
    let dict = &stream.dict;
    let raw = match filter(dict).ok()? {
        Some(b"DCTDecode") => {
            return image::load_from_memory(&stream.content).ok().map(|img| img.to_luma8());
        }
        Some(b"FlateDecode") => {
            let predictor = dict
                .get(b"DecodeParms")
                .and_then(Object::as_dict)
                .and_then(|parms| parms.get(b"Predictor"))
                .and_then(Object::as_i64)
                .unwrap_or(1);
            if predictor > 1 {
                return None;
            }
            let mut out = Vec::new();
            ZlibDecoder::new(stream.content.as_slice()).read_to_end(&mut out).ok()?;
            out
        }
        None => stream.content.clone(),
        Some(_) => return None,
    };

    if dimension(dict, b"BitsPerComponent") != 8 {
        return None;
    }
    let width = u32::try_from(dimension(dict, b"Width")).ok()?;
    let height = u32::try_from(dimension(dict, b"Height")).ok()?;
    let channels = components(doc, dict)?;
    let pixels = usize::try_from(u64::from(width) * u64::from(height)).ok()?;
    if width == 0 || height == 0 || raw.len() < pixels.checked_mul(channels)? {
        return None;
    }

    let gray = GrayImage::from_fn(width, height, |x, y| {
        let i = (y as usize * width as usize + x as usize) * channels;
        let px = &raw[i..i + channels];
        let value = match channels {
            1 => f64::from(px[0]),
            3 => 0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2]),
            4 => {
                let k = f64::from(px[3]);
                let ink = 0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2]);
                (255.0 - ink) * (255.0 - k) / 255.0
            }
            _ => f64::from(px[0]),
        };
        Luma([value.round().clamp(0.0, 255.0) as u8])
    });
    Some(gray)
}
