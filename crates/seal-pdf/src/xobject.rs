//! Seal images as PDF image XObjects

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::ColorType;
use lopdf::{dictionary, Document, ObjectId, Stream};
use seal_raster::{decode, ProcessedSeal, RasterFormat};
use seal_types::{Result, SealError};
use std::io::Write;
use tracing::debug;

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Add `seal` to `doc` as an image XObject and return its id.
///
/// JPEG seals are embedded as-is (DCTDecode). PNG seals are re-encoded
/// losslessly with Flate; any transparency goes into a soft mask.
pub fn embed_seal(doc: &mut Document, seal: &ProcessedSeal) -> Result<ObjectId> {
    let image = decode(&seal.bytes)?;
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));

    if seal.format == RasterFormat::Jpeg {
        let color_space = match image.color() {
            ColorType::L8 | ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        debug!(width, height, "embedding JPEG seal");
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            seal.bytes.clone(),
        );
        return Ok(doc.add_object(stream));
    }

    let rgba = image.to_rgba8();
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    let mut alpha = Vec::with_capacity(rgba.len() / 4);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }
    let has_alpha = alpha.iter().any(|&a| a < u8::MAX);
    debug!(width, height, has_alpha, "embedding PNG seal");

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if has_alpha {
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        );
        dict.set("SMask", doc.add_object(smask));
    }
    Ok(doc.add_object(Stream::new(dict, deflate(&rgb)?)))
}

/// Raw pixel size check shared by callers that place the image in points.
pub fn seal_extent(seal: &ProcessedSeal) -> Result<(f64, f64)> {
    if seal.width == 0 || seal.height == 0 {
        return Err(SealError::format("seal image is empty"));
    }
    Ok((f64::from(seal.width), f64::from(seal.height)))
}
