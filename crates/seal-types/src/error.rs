use thiserror::Error;

/// Failure of one pipeline stage. Any error aborts the whole request.
#[derive(Error, Debug)]
pub enum SealError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unsupported or corrupt input: {0}")]
    Format(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Placement out of bounds: {0}")]
    Geometry(String),

    #[error("Signing failed: {0}")]
    Crypto(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`SealError`], for callers that branch on the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Format,
    NotFound,
    Geometry,
    Crypto,
    Timeout,
    Io,
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealError::Validation(_) => ErrorKind::Validation,
            SealError::Format(_) => ErrorKind::Format,
            SealError::NotFound(_) => ErrorKind::NotFound,
            SealError::Geometry(_) => ErrorKind::Geometry,
            SealError::Crypto(_) => ErrorKind::Crypto,
            SealError::Timeout(_) => ErrorKind::Timeout,
            SealError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SealError::Validation(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        SealError::Format(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        SealError::Crypto(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SealError>;
