//! Signing identity provider
//!
//! The default identity is loaded lazily, exactly once, behind a guarded
//! init; concurrent first use blocks on the guard instead of loading twice.
//! Request-referenced keystores are cached by reference so each one is
//! opened at most once per provider.

use crate::keys::KeystoreIdentity;
use seal_types::{Result, SealError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::info;

/// Password of the bundled keystore and of keystores referenced by requests
pub const DEFAULT_KEYSTORE_PASSWORD: &str = "Pa$$w0rd";

const BUNDLED_KEYSTORE: &[u8] = include_bytes!("../assets/default-keystore.p12");

/// Where the default identity comes from.
#[derive(Debug, Clone)]
pub enum KeystoreSource {
    /// Keystore compiled into the binary
    Bundled,
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl KeystoreSource {
    fn read(&self) -> Result<Vec<u8>> {
        match self {
            KeystoreSource::Bundled => Ok(BUNDLED_KEYSTORE.to_vec()),
            KeystoreSource::File(path) => std::fs::read(path).map_err(|e| {
                SealError::crypto(format!("cannot read keystore {}: {e}", path.display()))
            }),
            KeystoreSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

pub struct IdentityProvider {
    source: KeystoreSource,
    password: String,
    default: OnceLock<Arc<KeystoreIdentity>>,
    init: Mutex<()>,
    overrides: Mutex<HashMap<String, Arc<KeystoreIdentity>>>,
}

impl IdentityProvider {
    pub fn new(source: KeystoreSource, password: impl Into<String>) -> Self {
        Self {
            source,
            password: password.into(),
            default: OnceLock::new(),
            init: Mutex::new(()),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    pub fn bundled() -> Self {
        Self::new(KeystoreSource::Bundled, DEFAULT_KEYSTORE_PASSWORD)
    }

    /// The service-wide identity, loaded on first call.
    pub fn default_identity(&self) -> Result<Arc<KeystoreIdentity>> {
        if let Some(identity) = self.default.get() {
            return Ok(Arc::clone(identity));
        }
        let _guard = self
            .init
            .lock()
            .map_err(|_| SealError::crypto("identity initialization lock poisoned"))?;
        if let Some(identity) = self.default.get() {
            return Ok(Arc::clone(identity));
        }

        let bytes = self.source.read()?;
        let identity = Arc::new(KeystoreIdentity::from_pkcs12(&bytes, &self.password)?);
        info!(alias = identity.alias(), "default signing identity loaded");
        // Only this thread can reach here while holding the guard.
        let _ = self.default.set(Arc::clone(&identity));
        Ok(identity)
    }

    /// Identity from a request-referenced keystore, fetched with `fetch` on
    /// first use of `reference` and cached afterwards.
    pub fn identity_for<F>(&self, reference: &str, fetch: F) -> Result<Arc<KeystoreIdentity>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let mut cache = self
            .overrides
            .lock()
            .map_err(|_| SealError::crypto("keystore cache lock poisoned"))?;
        if let Some(identity) = cache.get(reference) {
            return Ok(Arc::clone(identity));
        }
        let bytes = fetch()?;
        let identity = Arc::new(KeystoreIdentity::from_pkcs12(&bytes, &self.password)?);
        info!(reference, alias = identity.alias(), "request keystore loaded");
        cache.insert(reference.to_string(), Arc::clone(&identity));
        Ok(identity)
    }

    /// Resolve the identity for an optional request override.
    pub fn resolve<F>(&self, reference: Option<&str>, fetch: F) -> Result<Arc<KeystoreIdentity>>
    where
        F: FnOnce(&str) -> Result<Vec<u8>>,
    {
        match reference {
            Some(reference) => self.identity_for(reference, || fetch(reference)),
            None => self.default_identity(),
        }
    }
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::bundled()
    }
}
