//! Checking the signatures [`crate::PdfSigner`] writes

use crate::PdfContext;
use lopdf::{Dictionary, Document, Object};
use seal_crypto::{verify_detached_signed_data, VerifiedSignature};
use seal_types::{Result, SealError};
use tracing::debug;

/// One valid signature dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureReport {
    /// `/Name` of the signature dictionary
    pub name: Option<String>,
    /// `/M` as written, e.g. `D:20260101120000+00'00'`
    pub signing_time: Option<String>,
    pub byte_range: [usize; 4],
    /// The two ranges span the file except the Contents string.
    pub covers_whole_file: bool,
    pub signer: VerifiedSignature,
}

fn decode_text(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn is_signature(dict: &Dictionary) -> bool {
    let typed = matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name == b"Sig");
    typed || (dict.has(b"ByteRange") && dict.has(b"Contents"))
}

fn byte_range(doc: &Document, dict: &Dictionary, file_len: usize) -> Result<[usize; 4]> {
    let obj = dict.get(b"ByteRange").pdf_context("signature without ByteRange")?;
    let (_, obj) = doc.dereference(obj).pdf_context("ByteRange")?;
    let values = obj.as_array().pdf_context("ByteRange is not an array")?;
    if values.len() != 4 {
        return Err(SealError::format(format!(
            "ByteRange has {} entries, expected 4",
            values.len()
        )));
    }
    let mut range = [0usize; 4];
    for (slot, value) in range.iter_mut().zip(values) {
        let n = value.as_i64().pdf_context("ByteRange entry")?;
        *slot = usize::try_from(n).map_err(|_| SealError::format("negative ByteRange entry"))?;
    }
    let [start1, len1, start2, len2] = range;
    let in_file = start1.checked_add(len1).is_some_and(|end| end <= start2)
        && start2.checked_add(len2).is_some_and(|end| end <= file_len);
    if !in_file {
        return Err(SealError::format(format!("ByteRange {range:?} exceeds the file")));
    }
    Ok(range)
}

/// Verify every signature in `bytes`.
///
/// Fails with `NotFound` when the document carries no signature and with
/// `Crypto` as soon as one signature does not match the bytes it covers.
pub fn verify_pdf_signatures(bytes: &[u8]) -> Result<Vec<SignatureReport>> {
    let doc = Document::load_mem(bytes).pdf_context("PDF parse error")?;
    let mut reports = Vec::new();

    for (id, obj) in &doc.objects {
        let Ok(dict) = obj.as_dict() else {
            continue;
        };
        if !is_signature(dict) {
            continue;
        }
        let range = byte_range(&doc, dict, bytes.len())?;
        let [start1, len1, start2, len2] = range;
        let contents = dict
            .get(b"Contents")
            .and_then(Object::as_str)
            .pdf_context("signature without Contents")?;

        let mut signed = Vec::with_capacity(len1 + len2);
        signed.extend_from_slice(&bytes[start1..start1 + len1]);
        signed.extend_from_slice(&bytes[start2..start2 + len2]);
        let signer = verify_detached_signed_data(contents, &signed)?;

        let gap = &bytes[start1 + len1..start2];
        let covers_whole_file = start1 == 0
            && start2 + len2 == bytes.len()
            && gap.first() == Some(&b'<')
            && gap.last() == Some(&b'>');
        debug!(object = id.0, covers_whole_file, "signature verified");

        reports.push(SignatureReport {
            name: dict.get(b"Name").ok().and_then(decode_text),
            signing_time: dict.get(b"M").ok().and_then(decode_text),
            byte_range: range,
            covers_whole_file,
            signer,
        });
    }

    if reports.is_empty() {
        return Err(SealError::NotFound("document carries no signature".into()));
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use crate::fixtures::blank_pdf;
    use crate::parser::PdfDocument;
    use crate::signer::{PdfSigner, SignatureDescriptor, SignatureField};
    use pretty_assertions::assert_eq;
    use seal_crypto::cert::generate_self_signed_keystore;
    use seal_crypto::KeystoreIdentity;
    use seal_types::ErrorKind;

    fn signed_blank() -> Vec<u8> {
        let p12 = generate_self_signed_keystore("Verifier Test", "pw").unwrap();
        let identity = KeystoreIdentity::from_pkcs12(&p12, "pw").unwrap();
        let mut pdf = PdfDocument::from_bytes(&blank_pdf(1)).unwrap();
        PdfSigner::new(&mut pdf, &identity)
            .sign(
                &SignatureField::invisible(0),
                &SignatureDescriptor::new("Ünïcode Signer", "Lab", "Testing"),
            )
            .unwrap()
    }

    #[test]
    fn test_unsigned_document() {
        let err = verify_pdf_signatures(&blank_pdf(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_report_fields() {
        let signed = signed_blank();
        let reports = verify_pdf_signatures(&signed).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.name.as_deref(), Some("Ünïcode Signer"));
        assert!(report.signing_time.as_deref().unwrap().starts_with("D:"));
        assert_eq!(report.byte_range[0], 0);
        assert_eq!(report.byte_range[2] + report.byte_range[3], signed.len());
        assert!(report.covers_whole_file);
        assert_eq!(report.signer.common_name.as_deref(), Some("Verifier Test"));
    }

    #[test]
    fn test_byte_range_must_stay_in_file() {
        let doc = Document::with_version("1.5");
        let dict = lopdf::dictionary! {
            "ByteRange" => vec![0.into(), 10.into(), 20.into(), 30.into()],
        };
        assert_eq!(byte_range(&doc, &dict, 50).unwrap(), [0, 10, 20, 30]);
        assert_eq!(byte_range(&doc, &dict, 49).unwrap_err().kind(), ErrorKind::Format);

        let overlapping = lopdf::dictionary! {
            "ByteRange" => vec![0.into(), 25.into(), 20.into(), 30.into()],
        };
        assert!(byte_range(&doc, &overlapping, 50).is_err());
        let negative = lopdf::dictionary! {
            "ByteRange" => vec![0.into(), (-1).into(), 20.into(), 30.into()],
        };
        assert!(byte_range(&doc, &negative, 50).is_err());
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(
            decode_text(&Object::String(b"plain".to_vec(), lopdf::StringFormat::Literal)).as_deref(),
            Some("plain")
        );
        assert_eq!(decode_text(&Object::Integer(1)), None);
    }
}
