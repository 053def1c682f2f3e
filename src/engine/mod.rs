//! OCR engine abstraction.
//!
//! The pipeline never talks to a recognizer directly. It holds an
//! `Arc<dyn OcrEngine>` supplied through [`crate::OcrConfig`], so the engine
//! is an injected capability rather than a process-global: production wires
//! in [`TesseractEngine`], tests wire in deterministic stubs.
//!
//! Engines are synchronous and single-image: the dispatcher calls
//! [`OcrEngine::recognize`] once per page from a blocking-pool thread, so
//! implementations may block freely but must be `Send + Sync`.

mod tesseract;

pub use tesseract::TesseractEngine;

use crate::output::{OutputMode, RecognizedPage};
use std::path::Path;
use thiserror::Error;

/// Errors an engine implementation can produce.
///
/// Promoted to [`crate::error::OcrError`] at the pipeline boundary; inside
/// the dispatcher they travel as [`crate::error::PageError`] values.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be found or probed.
    #[error("engine not available: {0}")]
    Unavailable(String),

    /// The engine ran but failed or produced unusable output.
    #[error("{0}")]
    Failed(String),

    /// I/O around the engine invocation (image or output files).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A recognizer that turns one page image into OCR output.
pub trait OcrEngine: Send + Sync {
    /// Short stable name used in logs and error messages.
    fn id(&self) -> &'static str;

    /// Probe whether the engine can run at all. Called once when the
    /// pipeline is constructed, never per page.
    fn check_available(&self) -> Result<(), EngineError>;

    /// Recognize one page image.
    ///
    /// `image` is a raster file on disk (the pipeline stages PNGs). The
    /// returned variant must match `mode`: a single-page searchable PDF, or
    /// the page's text (possibly empty). Must behave as a pure function of
    /// the image content; no shared mutable state across calls.
    fn recognize(&self, image: &Path, mode: OutputMode) -> Result<RecognizedPage, EngineError>;
}
