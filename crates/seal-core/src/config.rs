//! Service configuration
//!
//! Defaults are usable as-is. A TOML file can override any field, and
//! `SEAL_*` environment variables override the file.

use seal_crypto::DEFAULT_KEYSTORE_PASSWORD;
use seal_types::{Result, SealError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    /// Luma cutoff for background removal; lighter pixels become transparent
    pub matting_threshold: u8,
    /// Seal area as a percentage of the page area on PDFs
    pub pdf_seal_percent: f64,
    /// Seal area as a percentage of the image area on rasters
    pub raster_seal_percent: f64,
    pub ocr_dpi: u32,
    /// Maximum vertical distance, in pixels, between boxes on one text line
    pub ocr_line_threshold: f32,
    pub ocr_pool_size: usize,
    pub ocr_acquire_timeout_ms: u64,
    /// Largest seal, document or keystore accepted, in bytes
    pub max_input_bytes: usize,
    /// PKCS#12 file replacing the bundled default identity
    pub keystore_path: Option<PathBuf>,
    pub keystore_password: String,
    pub signer_name: String,
    pub signer_location: String,
    pub signer_reason: String,
    pub jpeg_quality: u8,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            matting_threshold: seal_raster::matting::DEFAULT_THRESHOLD,
            pdf_seal_percent: 5.0,
            raster_seal_percent: 7.0,
            ocr_dpi: 300,
            ocr_line_threshold: seal_raster::ocr::DEFAULT_LINE_THRESHOLD,
            ocr_pool_size: 1,
            ocr_acquire_timeout_ms: 30_000,
            max_input_bytes: 50 * 1024 * 1024,
            keystore_path: None,
            keystore_password: DEFAULT_KEYSTORE_PASSWORD.to_string(),
            signer_name: "Seal Service".to_string(),
            signer_location: String::new(),
            signer_reason: "Is used to protect file from being modified".to_string(),
            jpeg_quality: 90,
        }
    }
}

fn override_field<T: FromStr>(
    slot: &mut T,
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| SealError::validation(format!("{key}: cannot parse {value:?}")))?;
    }
    Ok(())
}

impl SealConfig {
    /// Read a TOML file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| SealError::validation(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `SEAL_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Optional file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by `SEAL_<FIELD>` in upper case.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        override_field(&mut self.matting_threshold, "SEAL_MATTING_THRESHOLD", &lookup)?;
        override_field(&mut self.pdf_seal_percent, "SEAL_PDF_SEAL_PERCENT", &lookup)?;
        override_field(&mut self.raster_seal_percent, "SEAL_RASTER_SEAL_PERCENT", &lookup)?;
        override_field(&mut self.ocr_dpi, "SEAL_OCR_DPI", &lookup)?;
        override_field(&mut self.ocr_line_threshold, "SEAL_OCR_LINE_THRESHOLD", &lookup)?;
        override_field(&mut self.ocr_pool_size, "SEAL_OCR_POOL_SIZE", &lookup)?;
        override_field(&mut self.ocr_acquire_timeout_ms, "SEAL_OCR_ACQUIRE_TIMEOUT_MS", &lookup)?;
        override_field(&mut self.max_input_bytes, "SEAL_MAX_INPUT_BYTES", &lookup)?;
        override_field(&mut self.keystore_password, "SEAL_KEYSTORE_PASSWORD", &lookup)?;
        override_field(&mut self.signer_name, "SEAL_SIGNER_NAME", &lookup)?;
        override_field(&mut self.signer_location, "SEAL_SIGNER_LOCATION", &lookup)?;
        override_field(&mut self.signer_reason, "SEAL_SIGNER_REASON", &lookup)?;
        override_field(&mut self.jpeg_quality, "SEAL_JPEG_QUALITY", &lookup)?;
        if let Some(path) = lookup("SEAL_KEYSTORE_PATH") {
            self.keystore_path = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, percent) in [
            ("pdf_seal_percent", self.pdf_seal_percent),
            ("raster_seal_percent", self.raster_seal_percent),
        ] {
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(SealError::validation(format!(
                    "{name} must be in (0, 100], got {percent}"
                )));
            }
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(SealError::validation("jpeg_quality must be in 1..=100"));
        }
        if self.ocr_dpi == 0 {
            return Err(SealError::validation("ocr_dpi must be positive"));
        }
        if self.max_input_bytes == 0 {
            return Err(SealError::validation("max_input_bytes must be positive"));
        }
        Ok(())
    }

    pub fn ocr_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_acquire_timeout_ms)
    }
}
