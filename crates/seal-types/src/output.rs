use serde::{Deserialize, Serialize};

/// MIME type of a finished payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Pdf,
    Jpeg,
    Zip,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Pdf => "application/pdf",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Zip => "application/zip",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Jpeg => "jpg",
            ContentType::Zip => "zip",
        }
    }
}

/// Final output of one request. Ownership passes to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedResult {
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
    pub file_name: String,
}
