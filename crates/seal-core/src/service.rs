//! The request pipeline
//!
//! validate -> locate or resolve -> preprocess -> composite -> sign ->
//! package. Every stage returns its failure to the caller; nothing is
//! retried except the text layer to OCR fallback inside the locator.
//!
//! Placements are computed once against the unmodified input. Seals are
//! overlays and never move existing content, so drawing one cannot
//! invalidate the placements that follow it.

use crate::config::SealConfig;
use crate::locate::KeywordLocator;
use crate::package::{self, InputKind};
use crate::placement::{resolve_keyword, CoordinateSpec};
use crate::store::FileStore;
use seal_crypto::{IdentityProvider, KeystoreIdentity, KeystoreSource};
use seal_pdf::{stamp_seal, PdfDocument, PdfSigner, SignatureDescriptor, SignatureField};
use seal_raster::ocr::{OcrEngine, OcrPipeline, OcrPool};
use seal_raster::{
    composite, decode, encode_jpeg, sign_image, target_dimensions, vertical_stack, ProcessedSeal,
    RasterFormat, SealPreprocessor,
};
use seal_types::{Anchor, ContentType, InputRef, PlacementPoint, Result, SealError, SignRequest, SignedResult};
use std::sync::Arc;
use tracing::{debug, info, info_span, instrument};

/// Bytes of one input after file codes are resolved.
struct Loaded {
    bytes: Vec<u8>,
    file_name: String,
}

pub struct SealService {
    config: SealConfig,
    store: Arc<dyn FileStore>,
    identities: IdentityProvider,
    locator: KeywordLocator,
    preprocessor: SealPreprocessor,
}

impl SealService {
    /// Service with a text-layer-only locator; add OCR with
    /// [`SealService::with_locator`].
    pub fn new(config: SealConfig, store: Arc<dyn FileStore>) -> Self {
        let source = match &config.keystore_path {
            Some(path) => KeystoreSource::File(path.clone()),
            None => KeystoreSource::Bundled,
        };
        let identities = IdentityProvider::new(source, config.keystore_password.clone());
        let preprocessor = SealPreprocessor::new(config.matting_threshold);
        Self {
            config,
            store,
            identities,
            locator: KeywordLocator::text_only(),
            preprocessor,
        }
    }

    pub fn with_locator(mut self, locator: KeywordLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Enable the OCR fallback with a pool of `ocr_pool_size` engines built
    /// by `factory`, sized and timed from the configuration.
    pub fn with_ocr<F>(self, factory: F) -> Result<Self>
    where
        F: FnMut() -> Result<OcrEngine>,
    {
        let pool = OcrPool::with_factory(
            self.config.ocr_pool_size,
            self.config.ocr_acquire_timeout(),
            factory,
        )?;
        let pipeline = Arc::new(OcrPipeline::new(pool, self.config.ocr_line_threshold));
        let dpi = self.config.ocr_dpi;
        Ok(self.with_locator(KeywordLocator::with_ocr(pipeline, dpi)))
    }

    pub fn with_identities(mut self, identities: IdentityProvider) -> Self {
        self.identities = identities;
        self
    }

    pub fn config(&self) -> &SealConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    fn load(&self, input: &InputRef) -> Result<Loaded> {
        let loaded = match input {
            InputRef::Inline { bytes, file_name } => Loaded {
                bytes: bytes.clone(),
                file_name: file_name.clone(),
            },
            InputRef::FileCode(code) => {
                let file = self.store.get(code)?;
                Loaded {
                    bytes: file.bytes,
                    file_name: file.file_name,
                }
            }
        };
        if loaded.bytes.len() > self.config.max_input_bytes {
            return Err(SealError::validation(format!(
                "{} is {} bytes, the limit is {}",
                loaded.file_name,
                loaded.bytes.len(),
                self.config.max_input_bytes
            )));
        }
        Ok(loaded)
    }

    fn identity(&self, request: &SignRequest) -> Result<Arc<KeystoreIdentity>> {
        self.identities
            .resolve(request.certificate.as_deref(), |code| {
                self.load(&InputRef::FileCode(code.to_string())).map(|f| f.bytes)
            })
    }

    /// Run one request to completion.
    #[instrument(skip_all, fields(mode = ?request.mode, documents = request.documents.len()))]
    pub fn run(&self, request: &SignRequest) -> Result<SignedResult> {
        let anchor = request.validate()?;
        let seal = self.load(&request.seal)?;
        let documents = request
            .documents
            .iter()
            .map(|doc| self.load(doc))
            .collect::<Result<Vec<_>>>()?;

        let kinds = documents
            .iter()
            .map(|doc| InputKind::sniff(&doc.bytes))
            .collect::<Result<Vec<_>>>()?;
        let pdfs = kinds.iter().filter(|k| **k == InputKind::Pdf).count();
        if pdfs > 0 && documents.len() > 1 {
            return Err(SealError::validation(
                "a request takes either one PDF or a set of images",
            ));
        }

        // Matting does not depend on the target, so it happens once.
        let matted = info_span!("preprocess").in_scope(|| self.preprocessor.matte(&seal.bytes))?;

        let result = if pdfs == 1 {
            if request.merge {
                return Err(SealError::validation("only images can be merged"));
            }
            let mut documents = documents;
            self.run_pdf(request, anchor, &matted, documents.remove(0))?
        } else {
            self.run_images(request, anchor, &matted, documents)?
        };

        info!(
            file_name = %result.file_name,
            content_type = result.content_type.mime(),
            len = result.bytes.len(),
            signer = request.signer.as_deref().unwrap_or(""),
            "request complete"
        );
        Ok(result)
    }

    /// Run a request and put the result in the file store.
    pub fn run_and_store(&self, request: &SignRequest) -> Result<(String, SignedResult)> {
        let result = self.run(request)?;
        let code = self.store.put(&result.bytes, result.content_type.extension())?;
        debug!(code, "result stored");
        Ok((code, result))
    }

    fn placements_pdf(&self, pdf: &PdfDocument, anchor: Anchor<'_>, request: &SignRequest) -> Result<Vec<PlacementPoint>> {
        let _span = info_span!("locate").entered();
        let sizes = pdf.page_sizes()?;
        let placements = match anchor {
            Anchor::Position(spec) => spec.parse::<CoordinateSpec>()?.resolve(&sizes)?,
            Anchor::Keyword(keyword) => {
                let hits = self.locator.locate_pdf(pdf, keyword)?;
                resolve_keyword(hits, &sizes, request.multiplicity)?
            }
        };
        if placements.is_empty() {
            return Err(SealError::validation("document has no pages"));
        }
        Ok(placements)
    }

    fn run_pdf(&self, request: &SignRequest, anchor: Anchor<'_>, matted: &[u8], doc: Loaded) -> Result<SignedResult> {
        let pdf = PdfDocument::from_bytes(&doc.bytes)?;
        let placements = self.placements_pdf(&pdf, anchor, request)?;

        // Each seal is sized against the page it lands on.
        let mut stamps = info_span!("preprocess").in_scope(|| {
            placements
                .into_iter()
                .map(|placement| {
                    let (w, h) = pdf.page_size(placement.target)?;
                    let seal = self.preprocessor.fit(matted, w * h, self.config.pdf_seal_percent)?;
                    Ok((placement, seal))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        // With a signature, the last placement is drawn by the signature widget.
        let widget = if request.digital_signature { stamps.pop() } else { None };

        let bytes = info_span!("composite", placements = stamps.len()).in_scope(|| {
            stamps.iter().try_fold(doc.bytes, |current, (placement, seal)| {
                let mut pdf = PdfDocument::from_bytes(&current)?;
                stamp_seal(&mut pdf, seal, placement)?;
                pdf.save_to_bytes()
            })
        })?;

        let bytes = match widget {
            Some((placement, seal)) => self.sign_pdf(request, &bytes, placement, seal)?,
            None => bytes,
        };
        Ok(package::single(bytes, ContentType::Pdf, &doc.file_name))
    }

    fn sign_pdf(&self, request: &SignRequest, bytes: &[u8], placement: PlacementPoint, seal: ProcessedSeal) -> Result<Vec<u8>> {
        let _span = info_span!("sign", kind = "pdf").entered();
        let identity = self.identity(request)?;
        let name = request
            .signer
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.config.signer_name.clone());
        let descriptor = SignatureDescriptor::new(name, &self.config.signer_location, &self.config.signer_reason);
        let mut pdf = PdfDocument::from_bytes(bytes)?;
        PdfSigner::new(&mut pdf, identity.as_ref()).sign(&SignatureField::visible(placement, seal), &descriptor)
    }

    /// Keyword placements per image. Each image is its own document for the
    /// multiplicity policy; images without the keyword are left unsealed, and
    /// only a set with no match anywhere is `NotFound`.
    fn placements_images(
        &self,
        images: &[Loaded],
        sizes: &[(f64, f64)],
        keyword: &str,
        request: &SignRequest,
    ) -> Result<Vec<Vec<PlacementPoint>>> {
        let mut placements = Vec::with_capacity(images.len());
        for (i, img) in images.iter().enumerate() {
            let gray = decode(&img.bytes)?.to_luma8();
            let hits = self.locator.locate_image(&gray, i, keyword)?;
            if hits.is_empty() {
                placements.push(Vec::new());
                continue;
            }
            placements.push(resolve_keyword(hits, sizes, request.multiplicity)?);
        }
        if placements.iter().all(Vec::is_empty) {
            return Err(SealError::NotFound(format!(
                "keyword {keyword:?} not found on any image"
            )));
        }
        Ok(placements)
    }

    fn run_images(&self, request: &SignRequest, anchor: Anchor<'_>, matted: &[u8], images: Vec<Loaded>) -> Result<SignedResult> {
        let quality = self.config.jpeg_quality;
        let sizes = images
            .iter()
            .map(|img| target_dimensions(&img.bytes).map(|(w, h)| (f64::from(w), f64::from(h))))
            .collect::<Result<Vec<_>>>()?;

        let placements: Vec<Vec<PlacementPoint>> = {
            let _span = info_span!("locate").entered();
            match anchor {
                Anchor::Position(spec) => {
                    let all = spec.parse::<CoordinateSpec>()?.resolve(&sizes)?;
                    (0..images.len())
                        .map(|i| all.iter().copied().filter(|p| p.target == i).collect())
                        .collect()
                }
                Anchor::Keyword(keyword) => self.placements_images(&images, &sizes, keyword, request)?,
            }
        };

        let mut outputs = Vec::with_capacity(images.len());
        for ((image, &(w, h)), points) in images.into_iter().zip(&sizes).zip(&placements) {
            let seal = info_span!("preprocess").in_scope(|| {
                self.preprocessor.fit(matted, w * h, self.config.raster_seal_percent)
            })?;
            let _span = info_span!("composite", placements = points.len()).entered();
            // Compositing re-encodes; untouched PNGs still have to come out as JPEG.
            let untouched_png = points.is_empty() && RasterFormat::sniff(&image.bytes) == Some(RasterFormat::Png);
            let start = if untouched_png {
                encode_jpeg(&decode(&image.bytes)?, quality)?
            } else {
                image.bytes
            };
            let bytes = points
                .iter()
                .try_fold(start, |current, point| composite(&current, &seal, point, quality))?;
            outputs.push((image.file_name, bytes));
        }

        let identity = if request.digital_signature {
            Some(self.identity(request)?)
        } else {
            None
        };
        let sign = |bytes: Vec<u8>| -> Result<Vec<u8>> {
            match &identity {
                Some(identity) => {
                    let _span = info_span!("sign", kind = "image").entered();
                    sign_image(&bytes, identity.as_ref())
                }
                None => Ok(bytes),
            }
        };

        let _span = info_span!("package", outputs = outputs.len(), merge = request.merge).entered();
        if request.merge {
            let first = outputs[0].0.clone();
            let images: Vec<Vec<u8>> = outputs.into_iter().map(|(_, bytes)| bytes).collect();
            let merged = sign(vertical_stack(&images, quality)?)?;
            return Ok(SignedResult {
                bytes: merged,
                content_type: ContentType::Jpeg,
                file_name: package::merged_name(&first),
            });
        }
        if outputs.len() == 1 {
            let (name, bytes) = outputs.remove(0);
            return Ok(package::single(sign(bytes)?, ContentType::Jpeg, &name));
        }
        let signed = outputs
            .into_iter()
            .map(|(name, bytes)| Ok((name, sign(bytes)?)))
            .collect::<Result<Vec<_>>>()?;
        package::bundle(signed)
    }

    /// Recognized or extracted text of a document, line by line.
    pub fn extract_text(&self, input: &InputRef) -> Result<Vec<String>> {
        let loaded = self.load(input)?;
        match InputKind::sniff(&loaded.bytes)? {
            InputKind::Pdf => self.locator.pdf_lines(&PdfDocument::from_bytes(&loaded.bytes)?),
            InputKind::Image(_) => self.locator.image_lines(&decode(&loaded.bytes)?.to_luma8()),
        }
    }
}
