//! File store boundary
//!
//! Requests may name their inputs by file code instead of carrying bytes.
//! The pipeline only reads and writes whole byte buffers through
//! [`FileStore`]; where those bytes live is the store's business.

use seal_types::{Result, SealError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A file fetched from the store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub trait FileStore: Send + Sync {
    /// Fetch by code; unknown codes are `NotFound`.
    fn get(&self, code: &str) -> Result<StoredFile>;

    /// Store `bytes` and return the new code. `suffix` is the extension
    /// without the dot.
    fn put(&self, bytes: &[u8], suffix: &str) -> Result<String>;
}

/// Mime type for the extensions the pipeline deals in.
pub fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("zip") => "application/zip",
        Some("p12" | "pfx") => "application/x-pkcs12",
        _ => "application/octet-stream",
    }
}

fn not_found(code: &str) -> SealError {
    SealError::NotFound(format!("file code {code:?} does not resolve"))
}

/// In-process store.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, StoredFile>>,
    next: AtomicU64,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file under a caller-chosen code.
    pub fn insert(&self, code: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) {
        let file_name = file_name.into();
        let file = StoredFile {
            mime_type: mime_for(&file_name).to_string(),
            bytes,
            file_name,
        };
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.into(), file);
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileStore for MemoryFileStore {
    fn get(&self, code: &str) -> Result<StoredFile> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
            .ok_or_else(|| not_found(code))
    }

    fn put(&self, bytes: &[u8], suffix: &str) -> Result<String> {
        let code = format!("mem-{:06}", self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.insert(code.clone(), format!("{code}.{suffix}"), bytes.to_vec());
        Ok(code)
    }
}

/// Files in one directory; the code is the file name.
#[derive(Debug, Clone)]
pub struct DirectoryFileStore {
    root: PathBuf,
}

impl DirectoryFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, code: &str) -> Result<PathBuf> {
        let plain = !code.is_empty()
            && !code.starts_with('.')
            && !code.contains(['/', '\\'])
            && code != "..";
        if !plain {
            return Err(SealError::validation(format!("invalid file code {code:?}")));
        }
        Ok(self.root.join(code))
    }
}

impl FileStore for DirectoryFileStore {
    fn get(&self, code: &str) -> Result<StoredFile> {
        let path = self.path_for(code)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found(code)),
            Err(e) => return Err(e.into()),
        };
        debug!(code, len = bytes.len(), "read stored file");
        Ok(StoredFile {
            mime_type: mime_for(code).to_string(),
            file_name: code.to_string(),
            bytes,
        })
    }

    fn put(&self, bytes: &[u8], suffix: &str) -> Result<String> {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut attempt = 0u32;
        loop {
            let code = format!("{stamp:x}-{attempt}.{suffix}");
            let path = self.path_for(&code)?;
            match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    std::io::Write::write_all(&mut file, bytes)?;
                    debug!(code, len = bytes.len(), "stored file");
                    return Ok(code);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
