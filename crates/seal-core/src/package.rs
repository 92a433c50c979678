//! Output packaging: single files, merged images and zip bundles

use seal_raster::RasterFormat;
use seal_types::{ContentType, Result, SealError, SignedResult};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// What a document's bytes turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image(RasterFormat),
}

impl InputKind {
    pub fn sniff(bytes: &[u8]) -> Result<Self> {
        if seal_pdf::is_pdf(bytes) {
            return Ok(InputKind::Pdf);
        }
        RasterFormat::sniff(bytes)
            .map(InputKind::Image)
            .ok_or_else(|| SealError::format("input is neither a PDF nor a JPEG/PNG image"))
    }
}

/// File name without directories and extension; `"document"` if empty.
pub fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
}

pub fn signed_name(file_name: &str, extension: &str) -> String {
    format!("{}-signed.{extension}", file_stem(file_name))
}

pub fn merged_name(first: &str) -> String {
    format!("{}-merged-signed.jpg", file_stem(first))
}

pub fn bundle_name(first: &str, count: usize) -> String {
    format!("{}-and-{count}-files-signed.zip", file_stem(first))
}

/// Entry name for a JPEG result: the original name when it already says
/// JPEG, otherwise the original stem with `.jpg`.
pub fn jpeg_entry_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    let is_jpeg = Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        base.to_string()
    } else {
        format!("{}.jpg", file_stem(original))
    }
}

/// Make names unique: later duplicates become `name(1).ext`, `name(2).ext`.
pub fn dedupe_names(names: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    names
        .iter()
        .map(|name| {
            if taken.insert(name.clone()) {
                return name.clone();
            }
            let path = Path::new(name);
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
            let ext = path.extension().and_then(|e| e.to_str());
            let unique = (1..)
                .map(|n| match ext {
                    Some(ext) => format!("{stem}({n}).{ext}"),
                    None => format!("{stem}({n})"),
                })
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| name.clone());
            taken.insert(unique.clone());
            unique
        })
        .collect()
}

/// Deflated zip of `(name, bytes)` entries; names are deduplicated.
pub fn zip_bundle(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, (_, bytes)) in dedupe_names(&names).into_iter().zip(entries) {
        writer.start_file(name.as_str(), options).map_err(zip_error)?;
        writer.write_all(bytes)?;
        debug!(entry = %name, len = bytes.len(), "zip entry written");
    }
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

fn zip_error(e: zip::result::ZipError) -> SealError {
    match e {
        zip::result::ZipError::Io(io) => SealError::Io(io),
        other => SealError::format(format!("zip: {other}")),
    }
}

pub fn single(bytes: Vec<u8>, content_type: ContentType, original: &str) -> SignedResult {
    SignedResult {
        file_name: signed_name(original, content_type.extension()),
        bytes,
        content_type,
    }
}

/// Zip-bundle JPEG results named after their originals.
pub fn bundle(results: Vec<(String, Vec<u8>)>) -> Result<SignedResult> {
    let first = results
        .first()
        .map(|(name, _)| name.clone())
        .ok_or_else(|| SealError::validation("nothing to package"))?;
    let entries: Vec<(String, Vec<u8>)> = results
        .into_iter()
        .map(|(name, bytes)| (jpeg_entry_name(&name), bytes))
        .collect();
    Ok(SignedResult {
        file_name: bundle_name(&first, entries.len()),
        bytes: zip_bundle(&entries)?,
        content_type: ContentType::Zip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    #[test]
    fn test_sniff() {
        assert_eq!(InputKind::sniff(b"%PDF-1.4\n").unwrap(), InputKind::Pdf);
        assert_eq!(
            InputKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]).unwrap(),
            InputKind::Image(RasterFormat::Jpeg)
        );
        assert!(InputKind::sniff(b"GIF89a").is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(signed_name("contract.pdf", "pdf"), "contract-signed.pdf");
        assert_eq!(signed_name("", "jpg"), "document-signed.jpg");
        assert_eq!(merged_name("scans/page1.png"), "page1-merged-signed.jpg");
        assert_eq!(bundle_name("receipt.jpg", 2), "receipt-and-2-files-signed.zip");
        assert_eq!(jpeg_entry_name("photo.JPEG"), "photo.JPEG");
        assert_eq!(jpeg_entry_name("dir/scan.png"), "scan.jpg");
    }

    #[test]
    fn test_dedupe() {
        let names: Vec<String> = ["a.jpg", "a.jpg", "b", "a.jpg", "b", "a(1).jpg"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            dedupe_names(&names),
            vec!["a.jpg", "a(1).jpg", "b", "a(2).jpg", "b(1)", "a(1)(1).jpg"]
        );
    }

    #[test]
    fn test_bundle_preserves_order_and_names() {
        let result = bundle(vec![
            ("receipt.jpg".into(), b"first".to_vec()),
            ("receipt.jpg".into(), b"second".to_vec()),
        ])
        .unwrap();
        assert_eq!(result.content_type, ContentType::Zip);
        assert_eq!(result.file_name, "receipt-and-2-files-signed.zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(result.bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut names = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            names.push((entry.name().to_string(), body));
        }
        assert_eq!(
            names,
            vec![
                ("receipt.jpg".to_string(), "first".to_string()),
                ("receipt(1).jpg".to_string(), "second".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_bundle() {
        assert!(bundle(Vec::new()).is_err());
    }
}
