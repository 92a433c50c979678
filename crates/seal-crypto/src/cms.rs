//! Detached CMS SignedData for PDF signatures
//!
//! The structure carries these signed attributes:
//! - content-type (id-data)
//! - message-digest (SHA-256 of the signed byte ranges)
//! - signing-time
//! - signing-certificate-v2 (ESS, hash of the leaf certificate)
//!
//! and embeds the whole certificate chain.

use crate::keys::{common_name, verify_with_certificate, KeyMaterial};
use cms::builder::{create_signing_time_attribute, SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::ContentInfo;
use cms::signed_data::{EncapsulatedContentInfo, SignedData, SignerIdentifier};
use der::asn1::{OctetString, SetOfVec};
use der::{Decode, Encode, Sequence, SliceReader};
use seal_types::{Result, SealError};
use sha2::{Digest, Sha256};
use signature::{Keypair, Signer};
use spki::{
    AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, ObjectIdentifier,
    SignatureBitStringEncoding,
};
use x509_cert::attr::{Attribute, AttributeValue};
use x509_cert::Certificate;

/// SHA-256: 2.16.840.1.101.3.4.2.1
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// id-data: 1.2.840.113549.1.7.1
const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// id-signedData: 1.2.840.113549.1.7.2
const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// message-digest attribute: 1.2.840.113549.1.9.4
const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// id-aa-signingCertificateV2: 1.2.840.113549.1.9.16.2.47
const OID_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

/// Longest issuer walk accepted when checking an embedded chain
const MAX_CHAIN_DEPTH: usize = 8;

fn cms_error(err: impl std::fmt::Display) -> SealError {
    SealError::crypto(format!("CMS encoding failed: {err}"))
}

/// Build a detached SignedData over content whose SHA-256 is `content_digest`.
///
/// `chain` is leaf first; every certificate is embedded.
pub fn build_detached_signed_data(
    key: &KeyMaterial,
    chain: &[Certificate],
    content_digest: &[u8],
) -> Result<Vec<u8>> {
    let leaf = chain
        .first()
        .ok_or_else(|| SealError::crypto("cannot sign without a certificate"))?;

    let econtent = EncapsulatedContentInfo {
        econtent_type: OID_DATA,
        econtent: None,
    };
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: None,
    };
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: leaf.tbs_certificate.issuer.clone(),
        serial_number: leaf.tbs_certificate.serial_number.clone(),
    });
    let attributes = vec![
        create_signing_time_attribute().map_err(cms_error)?,
        signing_certificate_v2_attribute(leaf)?,
    ];

    let mut builder = SignedDataBuilder::new(&econtent);
    builder
        .add_digest_algorithm(digest_algorithm.clone())
        .map_err(cms_error)?;
    for cert in chain {
        builder
            .add_certificate(CertificateChoices::Certificate(cert.clone()))
            .map_err(cms_error)?;
    }

    match key {
        KeyMaterial::Rsa(signer) => add_signer::<_, rsa::pkcs1v15::Signature>(
            &mut builder,
            signer,
            sid,
            digest_algorithm,
            &econtent,
            content_digest,
            attributes,
        )?,
        KeyMaterial::P256(signer) => add_signer::<_, p256::ecdsa::DerSignature>(
            &mut builder,
            signer,
            sid,
            digest_algorithm,
            &econtent,
            content_digest,
            attributes,
        )?,
    }

    builder
        .build()
        .map_err(cms_error)?
        .to_der()
        .map_err(cms_error)
}

fn add_signer<'a, S, Sig>(
    builder: &mut SignedDataBuilder<'_>,
    signer: &'a S,
    sid: SignerIdentifier,
    digest_algorithm: AlgorithmIdentifierOwned,
    econtent: &'a EncapsulatedContentInfo,
    content_digest: &'a [u8],
    attributes: Vec<Attribute>,
) -> Result<()>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
    Sig: SignatureBitStringEncoding,
{
    let mut info = SignerInfoBuilder::new(
        signer,
        sid,
        digest_algorithm,
        econtent,
        Some(content_digest),
    )
    .map_err(cms_error)?;
    for attribute in attributes {
        info.add_signed_attribute(attribute).map_err(cms_error)?;
    }
    builder.add_signer_info::<S, Sig>(info).map_err(cms_error)?;
    Ok(())
}

/// ESSCertIDv2 with the default (SHA-256) hash algorithm, so only the hash
/// is encoded.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct EssCertIdV2 {
    cert_hash: OctetString,
}

/// SigningCertificateV2 without policies.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SigningCertificateV2 {
    certs: Vec<EssCertIdV2>,
}

fn signing_certificate_v2_attribute(cert: &Certificate) -> Result<Attribute> {
    let cert_der = cert.to_der().map_err(cms_error)?;
    let cert_hash = OctetString::new(Sha256::digest(&cert_der).to_vec()).map_err(cms_error)?;
    let value = SigningCertificateV2 {
        certs: vec![EssCertIdV2 { cert_hash }],
    }
    .to_der()
    .map_err(cms_error)?;

    let value = AttributeValue::from_der(&value).map_err(cms_error)?;
    let values = SetOfVec::try_from(vec![value]).map_err(cms_error)?;
    Ok(Attribute {
        oid: OID_SIGNING_CERTIFICATE_V2,
        values,
    })
}

/// Outcome of a successful detached signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    /// RFC 4514 subject of the signing certificate
    pub subject: String,
    pub common_name: Option<String>,
    /// Number of certificates embedded in the SignedData
    pub certificate_count: usize,
}

/// Verify a detached SignedData against the content it covers.
///
/// `cms_der` may carry trailing padding (PDF signature placeholders are
/// zero-filled); only the first DER value is read. Checks the message
/// digest, the signature over the signed attributes, and every issuer link
/// of the embedded chain that can be resolved inside the structure.
pub fn verify_detached_signed_data(cms_der: &[u8], content: &[u8]) -> Result<VerifiedSignature> {
    let mut reader = SliceReader::new(cms_der).map_err(cms_error)?;
    let content_info = ContentInfo::decode(&mut reader).map_err(cms_error)?;
    if content_info.content_type != OID_SIGNED_DATA {
        return Err(SealError::crypto("CMS content is not SignedData"));
    }
    let signed_data_der = content_info.content.to_der().map_err(cms_error)?;
    let signed_data = SignedData::from_der(&signed_data_der).map_err(cms_error)?;
    if signed_data.encap_content_info.econtent.is_some() {
        return Err(SealError::crypto("SignedData is not detached"));
    }

    let certificates: Vec<&Certificate> = signed_data
        .certificates
        .as_ref()
        .map(|set| {
            set.0
                .iter()
                .filter_map(|choice| match choice {
                    CertificateChoices::Certificate(cert) => Some(cert),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let signer_info = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| SealError::crypto("SignedData has no signer"))?;

    let signer_cert = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => certificates.iter().copied().find(|c| {
            c.tbs_certificate.issuer == id.issuer
                && c.tbs_certificate.serial_number == id.serial_number
        }),
        SignerIdentifier::SubjectKeyIdentifier(_) => certificates.first().copied(),
    }
    .ok_or_else(|| SealError::crypto("signing certificate is not embedded"))?;

    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| SealError::crypto("signer carries no signed attributes"))?;

    let expected_digest = Sha256::digest(content);
    let digest_attr = signed_attrs
        .iter()
        .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
        .and_then(|attr| attr.values.iter().next())
        .ok_or_else(|| SealError::crypto("message-digest attribute missing"))?;
    if digest_attr.value() != expected_digest.as_slice() {
        return Err(SealError::crypto(
            "message digest does not match the signed content",
        ));
    }

    let signed_attrs_der = signed_attrs.to_der().map_err(cms_error)?;
    verify_with_certificate(
        signer_cert,
        &signed_attrs_der,
        signer_info.signature.as_bytes(),
    )?;
    verify_chain(signer_cert, &certificates)?;

    Ok(VerifiedSignature {
        subject: signer_cert.tbs_certificate.subject.to_string(),
        common_name: common_name(signer_cert),
        certificate_count: certificates.len(),
    })
}

/// Walk issuer links inside `pool`, checking each certificate signature.
/// Stops at a self-signed certificate or when the issuer is not embedded.
fn verify_chain(leaf: &Certificate, pool: &[&Certificate]) -> Result<()> {
    let mut current = leaf;
    for _ in 0..MAX_CHAIN_DEPTH {
        let issuer = match pool
            .iter()
            .copied()
            .find(|c| c.tbs_certificate.subject == current.tbs_certificate.issuer)
        {
            Some(issuer) => issuer,
            None => return Ok(()),
        };
        let tbs = current.tbs_certificate.to_der().map_err(cms_error)?;
        verify_with_certificate(issuer, &tbs, current.signature.raw_bytes()).map_err(|_| {
            SealError::crypto(format!(
                "certificate {} is not signed by its issuer",
                current.tbs_certificate.subject
            ))
        })?;
        if issuer.tbs_certificate.subject == issuer.tbs_certificate.issuer {
            return Ok(());
        }
        current = issuer;
    }
    Err(SealError::crypto("certificate chain is too deep"))
}
