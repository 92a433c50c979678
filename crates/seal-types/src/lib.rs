//! Shared types for seal placement and signing
//!
//! Request/response shapes, the placement coordinate model and the error
//! taxonomy used by every crate in the workspace.

pub mod error;
pub mod geometry;
pub mod output;
pub mod request;

pub use error::{ErrorKind, Result, SealError};
pub use geometry::{Origin, PlacementPoint, TextLocation};
pub use output::{ContentType, SignedResult};
pub use request::{Anchor, InputRef, Multiplicity, SignMode, SignRequest};
