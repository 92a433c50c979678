//! Key material and signature primitives for sealed documents
//!
//! Loads PKCS#12 keystores into signing identities, builds and verifies
//! detached CMS SignedData, and hands identities out through a provider
//! that loads each keystore at most once.

pub mod cert;
pub mod cms;
pub mod keys;
pub mod provider;

pub use cms::{build_detached_signed_data, verify_detached_signed_data, VerifiedSignature};
pub use keys::{KeyMaterial, KeystoreIdentity, SigningIdentity};
pub use provider::{IdentityProvider, KeystoreSource, DEFAULT_KEYSTORE_PASSWORD};
