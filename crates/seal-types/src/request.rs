//! Inbound request shape shared by every front end.

use crate::error::{Result, SealError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the seal position is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignMode {
    Position,
    Keyword,
}

/// Which keyword matches receive a seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Only the last match in document order (no policy given)
    #[default]
    Last,
    /// Exactly one match must exist (policy `0`)
    ExactlyOne,
    /// Every match, applied in document order (policy `1`)
    Every,
}

impl Multiplicity {
    /// Map the wire value (`null`, `0`, `1`) to a policy.
    pub fn from_code(code: Option<i64>) -> Result<Self> {
        match code {
            None => Ok(Multiplicity::Last),
            Some(0) => Ok(Multiplicity::ExactlyOne),
            Some(1) => Ok(Multiplicity::Every),
            Some(other) => Err(SealError::validation(format!(
                "unknown multiplicity policy {other}, expected 0 or 1"
            ))),
        }
    }
}

/// Bytes supplied directly, or a reference resolved through the file store.
#[derive(Clone, PartialEq, Eq)]
pub enum InputRef {
    Inline { bytes: Vec<u8>, file_name: String },
    FileCode(String),
}

impl InputRef {
    pub fn inline(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        InputRef::Inline {
            bytes,
            file_name: file_name.into(),
        }
    }
}

impl fmt::Debug for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRef::Inline { bytes, file_name } => f
                .debug_struct("Inline")
                .field("file_name", file_name)
                .field("len", &bytes.len())
                .finish(),
            InputRef::FileCode(code) => f.debug_tuple("FileCode").field(code).finish(),
        }
    }
}

/// Where to put the seal, once the request has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor<'a> {
    Position(&'a str),
    Keyword(&'a str),
}

#[derive(Debug, Clone)]
pub struct SignRequest {
    /// Person applying the seal; becomes the PDF signature name when given
    pub signer: Option<String>,
    pub mode: SignMode,
    /// `"x,y"` or `"page,x,y"`, used in [`SignMode::Position`]
    pub position: Option<String>,
    /// Text to search for, used in [`SignMode::Keyword`]
    pub keyword: Option<String>,
    pub multiplicity: Multiplicity,
    /// Stack several images into one instead of zipping them
    pub merge: bool,
    /// Produce a cryptographic signature over the result
    pub digital_signature: bool,
    /// File code of a PKCS#12 keystore that replaces the default identity
    pub certificate: Option<String>,
    pub seal: InputRef,
    pub documents: Vec<InputRef>,
}

impl SignRequest {
    /// Check that the mode and its populated field agree.
    pub fn anchor(&self) -> Result<Anchor<'_>> {
        let position = self.position.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let keyword = self.keyword.as_deref().filter(|s| !s.trim().is_empty());
        match (self.mode, position, keyword) {
            (SignMode::Position, Some(pos), None) => Ok(Anchor::Position(pos)),
            (SignMode::Keyword, None, Some(word)) => Ok(Anchor::Keyword(word)),
            (SignMode::Position, None, _) => {
                Err(SealError::validation("position mode requires a coordinate spec"))
            }
            (SignMode::Keyword, _, None) => {
                Err(SealError::validation("keyword mode requires a keyword"))
            }
            (SignMode::Position, Some(_), Some(_)) | (SignMode::Keyword, Some(_), Some(_)) => Err(
                SealError::validation("supply either a coordinate spec or a keyword, not both"),
            ),
        }
    }

    /// Full validation of the request shape, before any bytes are read.
    pub fn validate(&self) -> Result<Anchor<'_>> {
        if self.documents.is_empty() {
            return Err(SealError::validation("at least one document is required"));
        }
        if self.merge && self.documents.len() < 2 {
            return Err(SealError::validation("merging requires two or more images"));
        }
        self.anchor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(mode: SignMode, position: Option<&str>, keyword: Option<&str>) -> SignRequest {
        SignRequest {
            signer: None,
            mode,
            position: position.map(String::from),
            keyword: keyword.map(String::from),
            multiplicity: Multiplicity::Last,
            merge: false,
            digital_signature: false,
            certificate: None,
            seal: InputRef::FileCode("seal".into()),
            documents: vec![InputRef::FileCode("doc".into())],
        }
    }

    #[test]
    fn test_mode_and_field_agree() {
        let req = request(SignMode::Position, Some(" 1,50,50 "), None);
        assert_eq!(req.validate().unwrap(), Anchor::Position("1,50,50"));

        let req = request(SignMode::Keyword, None, Some("SUBTOTAL"));
        assert_eq!(req.validate().unwrap(), Anchor::Keyword("SUBTOTAL"));
    }

    #[test]
    fn test_mismatched_mode_rejected() {
        assert!(request(SignMode::Position, None, Some("word")).validate().is_err());
        assert!(request(SignMode::Keyword, Some("1,2"), None).validate().is_err());
        assert!(request(SignMode::Keyword, Some("1,2"), Some("w")).validate().is_err());
        assert!(request(SignMode::Keyword, None, Some("   ")).validate().is_err());
    }

    #[test]
    fn test_merge_needs_several_documents() {
        let mut req = request(SignMode::Position, Some("1,1"), None);
        req.merge = true;
        assert!(req.validate().is_err());
        req.documents.push(InputRef::FileCode("second".into()));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_multiplicity_codes() {
        assert_eq!(Multiplicity::from_code(None).unwrap(), Multiplicity::Last);
        assert_eq!(Multiplicity::from_code(Some(0)).unwrap(), Multiplicity::ExactlyOne);
        assert_eq!(Multiplicity::from_code(Some(1)).unwrap(), Multiplicity::Every);
        assert!(Multiplicity::from_code(Some(2)).is_err());
    }

    #[test]
    fn test_debug_hides_payload() {
        let input = InputRef::inline(vec![0u8; 4096], "scan.jpg");
        let rendered = format!("{input:?}");
        assert!(rendered.contains("scan.jpg"));
        assert!(rendered.contains("4096"));
    }
}
