//! Seal placement pipeline
//!
//! Ties the PDF and raster crates together behind one entry point,
//! [`SealService::run`]:
//!
//! - [`placement`] parses coordinate specs and applies the multiplicity policy
//! - [`locate`] finds keywords through the text layer or OCR
//! - [`package`] names results and bundles several into a zip
//! - [`store`] resolves file codes to bytes
//! - [`config`] loads tunables from TOML and `SEAL_*` variables

pub mod config;
pub mod locate;
pub mod package;
pub mod placement;
pub mod service;
pub mod store;

pub use config::SealConfig;
pub use locate::KeywordLocator;
pub use package::InputKind;
pub use placement::CoordinateSpec;
pub use service::SealService;
pub use store::{DirectoryFileStore, FileStore, MemoryFileStore, StoredFile};
