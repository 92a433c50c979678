//! Signing identities backed by keystore key material

use der::{Decode, Encode};
use p12_keystore::KeyStore;
use seal_types::{Result, SealError};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer, Verifier};
use spki::ObjectIdentifier;
use tracing::debug;
use x509_cert::Certificate;

/// rsaEncryption
const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// id-ecPublicKey
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// commonName
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Trait for any identity that can sign documents
pub trait SigningIdentity: Send + Sync {
    /// Sign raw data (SHA-256 is applied by the algorithm) and return the
    /// encoded signature value
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature produced by [`SigningIdentity::sign`]
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;

    /// Certificate chain, leaf first
    fn certificate_chain(&self) -> &[Certificate];

    /// Detached CMS SignedData over content whose SHA-256 is `content_digest`
    fn detached_signed_data(&self, content_digest: &[u8]) -> Result<Vec<u8>>;

    /// Common name of the leaf certificate
    fn signer_name(&self) -> Option<String> {
        self.certificate_chain().first().and_then(common_name)
    }
}

/// Private key extracted from a keystore.
#[derive(Clone)]
pub enum KeyMaterial {
    /// SHA256withRSA, PKCS#1 v1.5 padding
    Rsa(rsa::pkcs1v15::SigningKey<Sha256>),
    /// SHA256withECDSA on P-256
    P256(p256::ecdsa::SigningKey),
}

impl KeyMaterial {
    /// Decode an unencrypted PKCS#8 PrivateKeyInfo, trying RSA first.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        use p256::pkcs8::DecodePrivateKey as _;
        use rsa::pkcs8::DecodePrivateKey as _;

        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Rsa(rsa::pkcs1v15::SigningKey::<Sha256>::new(key)));
        }
        p256::ecdsa::SigningKey::from_pkcs8_der(der)
            .map(KeyMaterial::P256)
            .map_err(|e| SealError::crypto(format!("unsupported private key: {e}")))
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            KeyMaterial::Rsa(_) => "SHA256withRSA",
            KeyMaterial::P256(_) => "SHA256withECDSA",
        }
    }

    /// SubjectPublicKeyInfo of the matching public key
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        use p256::pkcs8::EncodePublicKey as _;
        use rsa::pkcs8::EncodePublicKey as _;
        use signature::Keypair;

        let doc = match self {
            KeyMaterial::Rsa(key) => key.verifying_key().to_public_key_der(),
            KeyMaterial::P256(key) => key.verifying_key().to_public_key_der(),
        };
        doc.map(|d| d.as_bytes().to_vec())
            .map_err(|e| SealError::crypto(format!("cannot encode public key: {e}")))
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyMaterial::Rsa(key) => {
                let signature: rsa::pkcs1v15::Signature = key
                    .try_sign(data)
                    .map_err(|e| SealError::crypto(format!("RSA signing failed: {e}")))?;
                Ok(signature.to_vec())
            }
            KeyMaterial::P256(key) => {
                let signature: p256::ecdsa::DerSignature = key
                    .try_sign(data)
                    .map_err(|e| SealError::crypto(format!("ECDSA signing failed: {e}")))?;
                Ok(signature.to_vec())
            }
        }
    }
}

/// Identity loaded from a PKCS#12 keystore: first private key entry plus
/// its certificate chain.
#[derive(Clone)]
pub struct KeystoreIdentity {
    alias: String,
    key: KeyMaterial,
    chain: Vec<Certificate>,
}

impl KeystoreIdentity {
    pub fn new(alias: impl Into<String>, key: KeyMaterial, chain: Vec<Certificate>) -> Result<Self> {
        let leaf = chain
            .first()
            .ok_or_else(|| SealError::crypto("certificate chain is empty"))?;
        let leaf_spki = leaf
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| SealError::crypto(format!("cannot encode certificate key: {e}")))?;
        if leaf_spki != key.public_key_der()? {
            return Err(SealError::crypto(
                "private key does not match the leaf certificate",
            ));
        }
        Ok(Self {
            alias: alias.into(),
            key,
            chain,
        })
    }

    /// Open a PKCS#12 keystore and take its first key entry.
    pub fn from_pkcs12(bytes: &[u8], password: &str) -> Result<Self> {
        let store = KeyStore::from_pkcs12(bytes, password)
            .map_err(|e| SealError::crypto(format!("cannot open keystore: {e}")))?;
        let (alias, entry) = store
            .private_key_chain()
            .ok_or_else(|| SealError::crypto("keystore holds no private key entry"))?;

        let key = KeyMaterial::from_pkcs8_der(entry.key())?;
        let chain = entry
            .chain()
            .iter()
            .map(|cert| Certificate::from_der(cert.as_der()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SealError::crypto(format!("invalid certificate in keystore: {e}")))?;

        debug!(
            alias,
            algorithm = key.algorithm(),
            chain_len = chain.len(),
            "loaded keystore identity"
        );
        Self::new(alias, key, chain)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }
}

impl SigningIdentity for KeystoreIdentity {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.key.sign(data)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        self.chain
            .first()
            .is_some_and(|leaf| verify_with_certificate(leaf, data, signature).is_ok())
    }

    fn certificate_chain(&self) -> &[Certificate] {
        &self.chain
    }

    fn detached_signed_data(&self, content_digest: &[u8]) -> Result<Vec<u8>> {
        crate::cms::build_detached_signed_data(&self.key, &self.chain, content_digest)
    }
}

/// Check `signature` over `data` against the certificate's public key.
///
/// The signature algorithm follows the key type: SHA256withRSA for RSA keys
/// and SHA256withECDSA (DER-encoded) for P-256 keys.
pub fn verify_with_certificate(cert: &Certificate, data: &[u8], signature: &[u8]) -> Result<()> {
    use p256::pkcs8::DecodePublicKey as _;
    use rsa::pkcs8::DecodePublicKey as _;

    let spki = &cert.tbs_certificate.subject_public_key_info;
    let spki_der = spki
        .to_der()
        .map_err(|e| SealError::crypto(format!("cannot encode certificate key: {e}")))?;

    let oid = spki.algorithm.oid;
    let verified = if oid == OID_RSA_ENCRYPTION {
        let public_key = rsa::RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| SealError::crypto(format!("invalid RSA public key: {e}")))?;
        let signature = rsa::pkcs1v15::Signature::try_from(signature)
            .map_err(|e| SealError::crypto(format!("malformed RSA signature: {e}")))?;
        rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key).verify(data, &signature)
    } else if oid == OID_EC_PUBLIC_KEY {
        let public_key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
            .map_err(|e| SealError::crypto(format!("invalid P-256 public key: {e}")))?;
        let signature = p256::ecdsa::DerSignature::try_from(signature)
            .map_err(|e| SealError::crypto(format!("malformed ECDSA signature: {e}")))?;
        public_key.verify(data, &signature)
    } else {
        return Err(SealError::crypto(format!(
            "unsupported public key algorithm {oid}"
        )));
    };
    verified.map_err(|_| SealError::crypto("signature does not verify"))
}

/// Common name from a certificate subject, if present.
pub fn common_name(cert: &Certificate) -> Option<String> {
    cert.tbs_certificate
        .subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == OID_COMMON_NAME)
        .map(|atv| String::from_utf8_lossy(atv.value.value()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::generate_self_signed_keystore;
    use pretty_assertions::assert_eq;

    const BUNDLED: &[u8] = include_bytes!("../assets/default-keystore.p12");

    fn p256_identity() -> KeystoreIdentity {
        let p12 = generate_self_signed_keystore("Unit Signer", "secret").unwrap();
        KeystoreIdentity::from_pkcs12(&p12, "secret").unwrap()
    }

    #[test]
    fn test_generated_keystore_roundtrip() {
        let identity = p256_identity();
        assert_eq!(identity.key().algorithm(), "SHA256withECDSA");
        assert_eq!(identity.certificate_chain().len(), 1);
        assert_eq!(identity.signer_name().as_deref(), Some("Unit Signer"));
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = p256_identity();
        let signature = identity.sign(b"final image bytes").unwrap();
        assert!(identity.verify(b"final image bytes", &signature));
        assert!(!identity.verify(b"tampered image bytes", &signature));
    }

    #[test]
    fn test_wrong_password_is_crypto_error() {
        let p12 = generate_self_signed_keystore("Unit Signer", "secret").unwrap();
        let err = KeystoreIdentity::from_pkcs12(&p12, "not-the-password").err().unwrap();
        assert_eq!(err.kind(), seal_types::ErrorKind::Crypto);
    }

    #[test]
    fn test_garbage_keystore_is_crypto_error() {
        let err = KeystoreIdentity::from_pkcs12(b"not a keystore", "x").err().unwrap();
        assert_eq!(err.kind(), seal_types::ErrorKind::Crypto);
    }

    #[test]
    fn test_bundled_keystore_is_rsa() {
        let identity =
            KeystoreIdentity::from_pkcs12(BUNDLED, crate::DEFAULT_KEYSTORE_PASSWORD).unwrap();
        assert_eq!(identity.key().algorithm(), "SHA256withRSA");
        let signature = identity.sign(b"payload").unwrap();
        assert_eq!(signature.len(), 256);
        assert!(identity.verify(b"payload", &signature));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let a = p256_identity();
        let b = p256_identity();
        let err = KeystoreIdentity::new("mixed", a.key().clone(), b.certificate_chain().to_vec())
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not match"));
    }
}
