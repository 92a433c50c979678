//! Signatures carried inside JPEG metadata.
//!
//! The signature covers the JPEG bytes without any Exif segment. It is
//! base64-encoded and stored as the MakerNote of a minimal Exif APP1
//! segment inserted right after SOI/APP0, so pixel data is never
//! re-encoded and stripping the segment gives back the signed bytes.

use crate::format::RasterFormat;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use seal_crypto::SigningIdentity;
use seal_types::{Result, SealError};
use std::ops::Range;
use tracing::debug;

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_MAKER_NOTE: u16 = 0x927C;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;

/// IFD0 holds one entry pointing at the Exif IFD
const EXIF_IFD_OFFSET: u32 = 8 + 2 + 12 + 4;
const MAKER_NOTE_OFFSET: u32 = EXIF_IFD_OFFSET + 2 + 12 + 4;

struct Segment {
    marker: u8,
    range: Range<usize>,
}

/// Marker segments up to the first scan, which is copied verbatim.
struct JpegLayout {
    segments: Vec<Segment>,
    scan_start: usize,
}

impl JpegLayout {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if RasterFormat::sniff(bytes) != Some(RasterFormat::Jpeg) {
            return Err(SealError::format("metadata signatures require a JPEG image"));
        }
        let mut segments = Vec::new();
        let mut pos = 2;
        loop {
            if bytes.get(pos) != Some(&0xFF) {
                return Err(SealError::format(format!("expected JPEG marker at offset {pos}")));
            }
            // Fill bytes
            while bytes.get(pos + 1) == Some(&0xFF) {
                pos += 1;
            }
            let marker = *bytes
                .get(pos + 1)
                .ok_or_else(|| SealError::format("truncated JPEG header"))?;
            match marker {
                SOS | EOI => return Ok(Self { segments, scan_start: pos }),
                0x01 | 0xD0..=0xD7 => {
                    pos += 2;
                    continue;
                }
                _ => {}
            }
            let len = match bytes.get(pos + 2..pos + 4) {
                Some(&[hi, lo]) => usize::from(u16::from_be_bytes([hi, lo])),
                _ => return Err(SealError::format("truncated JPEG segment")),
            };
            let end = pos + 2 + len;
            if len < 2 || end > bytes.len() {
                return Err(SealError::format(format!("bad JPEG segment length at offset {pos}")));
            }
            segments.push(Segment {
                marker,
                range: pos..end,
            });
            pos = end;
        }
    }

    fn payload<'a>(&self, bytes: &'a [u8], segment: &Segment) -> &'a [u8] {
        &bytes[segment.range.start + 4..segment.range.end]
    }

    fn is_exif(&self, bytes: &[u8], segment: &Segment) -> bool {
        segment.marker == APP1 && self.payload(bytes, segment).starts_with(EXIF_HEADER)
    }

    /// Re-assemble the image, dropping Exif and optionally inserting `app1`
    /// after the leading APP0 segments.
    fn rebuild(&self, bytes: &[u8], app1: Option<&[u8]>) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len() + app1.map_or(0, <[u8]>::len));
        out.extend_from_slice(&bytes[..2]);
        let mut pending = app1;
        for segment in &self.segments {
            if segment.marker != APP0 {
                if let Some(app1) = pending.take() {
                    out.extend_from_slice(app1);
                }
            }
            if !self.is_exif(bytes, segment) {
                out.extend_from_slice(&bytes[segment.range.clone()]);
            }
        }
        if let Some(app1) = pending {
            out.extend_from_slice(app1);
        }
        out.extend_from_slice(&bytes[self.scan_start..]);
        out
    }
}

/// JPEG bytes with every Exif segment removed.
pub fn strip_exif(bytes: &[u8]) -> Result<Vec<u8>> {
    let layout = JpegLayout::parse(bytes)?;
    Ok(layout.rebuild(bytes, None))
}

fn exif_segment(note: &[u8]) -> Result<Vec<u8>> {
    let count = u32::try_from(note.len())
        .map_err(|_| SealError::crypto("signature does not fit in image metadata"))?;

    let mut tiff = Vec::with_capacity(MAKER_NOTE_OFFSET as usize + note.len());
    tiff.extend_from_slice(b"MM");
    tiff.extend_from_slice(&42u16.to_be_bytes());
    tiff.extend_from_slice(&8u32.to_be_bytes());

    // IFD0
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&TAG_EXIF_IFD.to_be_bytes());
    tiff.extend_from_slice(&TYPE_LONG.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&EXIF_IFD_OFFSET.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());

    // Exif IFD
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&TAG_MAKER_NOTE.to_be_bytes());
    tiff.extend_from_slice(&TYPE_UNDEFINED.to_be_bytes());
    tiff.extend_from_slice(&count.to_be_bytes());
    if note.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..note.len()].copy_from_slice(note);
        tiff.extend_from_slice(&inline);
        tiff.extend_from_slice(&0u32.to_be_bytes());
    } else {
        tiff.extend_from_slice(&MAKER_NOTE_OFFSET.to_be_bytes());
        tiff.extend_from_slice(&0u32.to_be_bytes());
        tiff.extend_from_slice(note);
    }

    let len = u16::try_from(2 + EXIF_HEADER.len() + tiff.len())
        .map_err(|_| SealError::crypto("signature does not fit in an APP1 segment"))?;
    let mut segment = vec![0xFF, APP1];
    segment.extend_from_slice(&len.to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(&tiff);
    Ok(segment)
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let order = match data.get(..2)? {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return None,
        };
        Some(Self { data, order })
    }

    fn u16_at(&self, pos: usize) -> Option<u16> {
        let raw: [u8; 2] = self.data.get(pos..pos + 2)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    fn u32_at(&self, pos: usize) -> Option<u32> {
        let raw: [u8; 4] = self.data.get(pos..pos + 4)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    /// (type, count, position of the value field) of `tag` in the IFD at `ifd`
    fn entry(&self, ifd: usize, tag: u16) -> Option<(u16, u32, usize)> {
        let count = usize::from(self.u16_at(ifd)?);
        (0..count)
            .map(|i| ifd + 2 + i * 12)
            .find(|&pos| self.u16_at(pos) == Some(tag))
            .and_then(|pos| Some((self.u16_at(pos + 2)?, self.u32_at(pos + 4)?, pos + 8)))
    }

    fn maker_note(&self) -> Option<&'a [u8]> {
        let ifd0 = self.u32_at(4)? as usize;
        let (_, _, exif_pos) = self.entry(ifd0, TAG_EXIF_IFD)?;
        let exif_ifd = self.u32_at(exif_pos)? as usize;
        let (kind, count, value_pos) = self.entry(exif_ifd, TAG_MAKER_NOTE)?;
        if kind != TYPE_UNDEFINED {
            return None;
        }
        let count = count as usize;
        let start = if count <= 4 {
            value_pos
        } else {
            self.u32_at(value_pos)? as usize
        };
        self.data.get(start..start.checked_add(count)?)
    }
}

/// The base64 signature stored in the image, if any.
pub fn extract_signature(bytes: &[u8]) -> Result<Option<String>> {
    let layout = JpegLayout::parse(bytes)?;
    let note = layout
        .segments
        .iter()
        .filter(|segment| layout.is_exif(bytes, segment))
        .find_map(|segment| {
            let tiff = Tiff::new(&layout.payload(bytes, segment)[EXIF_HEADER.len()..])?;
            tiff.maker_note()
        });
    Ok(note.map(|raw| String::from_utf8_lossy(raw).into_owned()))
}

/// Sign the JPEG and embed the signature in its metadata.
///
/// Any existing Exif block is replaced. Pixel data is untouched.
pub fn sign_image(bytes: &[u8], identity: &dyn SigningIdentity) -> Result<Vec<u8>> {
    let layout = JpegLayout::parse(bytes)
        .map_err(|e| SealError::crypto(format!("cannot rewrite image metadata: {e}")))?;
    let unsigned = layout.rebuild(bytes, None);
    let signature = identity.sign(&unsigned)?;
    let segment = exif_segment(STANDARD.encode(signature).as_bytes())?;

    let stripped = JpegLayout::parse(&unsigned)
        .map_err(|e| SealError::crypto(format!("cannot rewrite image metadata: {e}")))?;
    debug!(len = unsigned.len(), "embedding image signature");
    Ok(stripped.rebuild(&unsigned, Some(&segment)))
}

/// Check the embedded signature against `identity`.
///
/// Returns `NotFound` when the image carries no signature.
pub fn verify_image_signature(bytes: &[u8], identity: &dyn SigningIdentity) -> Result<bool> {
    let encoded = extract_signature(bytes)?
        .ok_or_else(|| SealError::NotFound("image carries no embedded signature".into()))?;
    let signature = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SealError::crypto(format!("embedded signature is not base64: {e}")))?;
    let unsigned = strip_exif(bytes)?;
    Ok(identity.verify(&unsigned, &signature))
}
