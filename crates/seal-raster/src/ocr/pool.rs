//! Bounded pool of OCR engines shared across requests.
//!
//! Engines are expensive to build and not safe to call from two threads at
//! once, so each caller borrows one exclusively and hands it back when done.
//! Size the pool to the number of workers expected to run OCR concurrently.

use super::engine::OcrEngine;
use image::GrayImage;
use seal_types::{Result, SealError, TextLocation};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct OcrPool {
    idle: Mutex<Vec<OcrEngine>>,
    returned: Condvar,
    size: usize,
    timeout: Duration,
}

/// Exclusive loan of one engine; returned to the pool on drop.
struct Lease<'a> {
    pool: &'a OcrPool,
    engine: Option<OcrEngine>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}

impl OcrPool {
    pub fn new(engines: Vec<OcrEngine>, timeout: Duration) -> Self {
        Self {
            size: engines.len(),
            idle: Mutex::new(engines),
            returned: Condvar::new(),
            timeout,
        }
    }

    /// Build `size` engines up front with `factory`.
    pub fn with_factory<F>(size: usize, timeout: Duration, mut factory: F) -> Result<Self>
    where
        F: FnMut() -> Result<OcrEngine>,
    {
        let engines = (0..size).map(|_| factory()).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(engines, timeout))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn acquire(&self) -> Result<Lease<'_>> {
        if self.size == 0 {
            return Err(SealError::validation("OCR pool has no engines"));
        }
        let deadline = Instant::now() + self.timeout;
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(engine) = idle.pop() {
                return Ok(Lease {
                    pool: self,
                    engine: Some(engine),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SealError::Timeout(format!(
                    "no OCR engine became available within {} ms",
                    self.timeout.as_millis()
                )));
            }
            debug!("waiting for an OCR engine");
            let (guard, _) = self
                .returned
                .wait_timeout(idle, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            idle = guard;
        }
    }

    fn release(&self, engine: OcrEngine) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(engine);
        self.returned.notify_one();
    }

    /// Run `f` with exclusive use of one engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut OcrEngine) -> Result<R>) -> Result<R> {
        let mut lease = self.acquire()?;
        match lease.engine.as_mut() {
            Some(engine) => f(engine),
            None => Err(SealError::validation("OCR lease lost its engine")),
        }
    }
}

/// Pool plus the line grouping tolerance used for full-text extraction.
pub struct OcrPipeline {
    pool: OcrPool,
    line_threshold: f32,
}

impl OcrPipeline {
    pub fn new(pool: OcrPool, line_threshold: f32) -> Self {
        Self {
            pool,
            line_threshold,
        }
    }

    pub fn pool(&self) -> &OcrPool {
        &self.pool
    }

    pub fn find_keyword(&self, image: &GrayImage, keyword: &str, target: usize) -> Result<Vec<TextLocation>> {
        self.pool
            .with_engine(|engine| engine.find_keyword(image, keyword, target))
    }

    pub fn extract_lines(&self, image: &GrayImage) -> Result<Vec<String>> {
        let threshold = self.line_threshold;
        self.pool
            .with_engine(|engine| engine.extract_lines(image, threshold))
    }
}
