//! Self-signed keystore generation

use der::Encode;
use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use p256::ecdsa::{DerSignature, SigningKey};
use p256::pkcs8::EncodePrivateKey;
use rand_core::{OsRng, RngCore};
use seal_types::{Result, SealError};
use std::str::FromStr;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;

/// Ten years
const VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

fn cert_error(err: impl std::fmt::Display) -> SealError {
    SealError::crypto(format!("certificate generation failed: {err}"))
}

/// Generate a PKCS#12 keystore holding a fresh P-256 key and a self-signed
/// certificate for `common_name`, protected by `password`.
pub fn generate_self_signed_keystore(common_name: &str, password: &str) -> Result<Vec<u8>> {
    if common_name.contains([',', '+', '=']) {
        return Err(SealError::validation(
            "common name must not contain ',', '+' or '='",
        ));
    }

    let signing_key = SigningKey::random(&mut OsRng);
    let subject = Name::from_str(&format!("CN={common_name}")).map_err(cert_error)?;
    let public_key =
        SubjectPublicKeyInfoOwned::from_key(*signing_key.verifying_key()).map_err(cert_error)?;
    let serial = SerialNumber::from((OsRng.next_u32() >> 1) | 1);
    let validity = Validity::from_now(VALIDITY).map_err(cert_error)?;

    let builder = CertificateBuilder::new(
        Profile::Root,
        serial,
        validity,
        subject,
        public_key,
        &signing_key,
    )
    .map_err(cert_error)?;
    let certificate = builder.build::<DerSignature>().map_err(cert_error)?;
    let certificate_der = certificate.to_der().map_err(cert_error)?;

    let key_der = signing_key.to_pkcs8_der().map_err(cert_error)?;
    let local_key_id = {
        let mut id = [0u8; 8];
        OsRng.fill_bytes(&mut id);
        id
    };
    let chain = PrivateKeyChain::new(
        key_der.as_bytes(),
        local_key_id,
        [p12_keystore::Certificate::from_der(&certificate_der).map_err(cert_error)?],
    );

    let mut store = KeyStore::new();
    store.add_entry(common_name, KeyStoreEntry::PrivateKeyChain(chain));
    store.writer(password).write().map_err(cert_error)
}
