//! Error types for the ocrpipe library.
//!
//! Two distinct error types reflect two distinct scopes:
//!
//! * [`OcrError`] is **job-level**: the classification every failed job
//!   reports. Returned as `Err(OcrError)` from the top-level pipeline
//!   functions. A job either fully succeeds or fails with exactly one of
//!   these; there is no partial output.
//!
//! * [`PageError`] is **task-level**: the explicit error a single dispatched
//!   page task yields as `Result<PageResult, PageError>`. The dispatcher is
//!   fail-fast: the first `PageError` it sees is converted (via `From`) into
//!   the matching [`OcrError`] variant and the whole job fails.
//!
//! The separation keeps per-page failures inspectable values rather than
//! unwinding panics, while the public surface stays whole-job-or-nothing.

use std::path::PathBuf;
use thiserror::Error;

/// All job-level errors returned by the ocrpipe library.
///
/// Per-task failures use [`PageError`] inside the dispatcher and are
/// promoted into this enum before they reach a caller.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input bytes do not start with a PDF header.
    #[error("Input is not a PDF (missing %PDF header)\nFirst bytes: {magic:?}")]
    NotAPdf { magic: [u8; 4] },

    /// The input looked like a PDF but could not be opened or has no pages.
    #[error("Invalid PDF document: {detail}")]
    InvalidDocument { detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// pdfium failed to rasterize a specific page. Aborts the whole job;
    /// a silently skipped page would corrupt the output ordering.
    #[error("Rasterization failed for page {page}: {detail}")]
    RasterizeFailed { page: usize, detail: String },

    // ── Recognition errors ────────────────────────────────────────────────
    /// OCR failed for a specific page.
    #[error("Recognition failed for page {page}: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// A single-page fragment could not be merged into the output document.
    #[error("Failed to merge page fragments: {detail}")]
    MergeFailed { detail: String },

    /// The merged document's page count disagrees with the fragment count.
    #[error("Merged document has {actual} pages, expected {expected}")]
    PageCountMismatch { expected: usize, actual: usize },

    // ── Resource errors ───────────────────────────────────────────────────
    /// Scratch storage failed (create, stage, or purge).
    #[error("Scratch I/O failed at '{path}': {source}\nCheck free space and permissions on the scratch root.")]
    ScratchIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OCR engine binary is missing or not runnable.
    #[error(
        "OCR engine '{engine}' is not available: {detail}\n\n\
Install Tesseract and make sure it is on PATH:\n\
  • Debian/Ubuntu: sudo apt-get install tesseract-ocr\n\
  • macOS:         brew install tesseract\n\
  • Windows:       https://github.com/UB-Mannheim/tesseract/wiki\n\
Or point TESSERACT_PATH at an existing binary.\n"
    )]
    EngineUnavailable { engine: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, broken invariant).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The explicit error value a single page task yields.
///
/// Carried as the `Err` arm of `Result<PageResult, PageError>` out of the
/// worker body; the dispatcher promotes the first one it collects into
/// [`OcrError`] and abandons the rest of the job.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// The OCR engine rejected or failed on this page's image.
    #[error("Page {page}: recognition failed: {detail}")]
    Recognition { page: usize, detail: String },

    /// The page image could not be written into job scratch.
    #[error("Page {page}: failed to stage '{path}': {detail}")]
    Stage {
        page: usize,
        path: PathBuf,
        detail: String,
    },
}

impl PageError {
    /// Page number this error is attributed to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Recognition { page, .. } => *page,
            PageError::Stage { page, .. } => *page,
        }
    }
}

impl From<PageError> for OcrError {
    fn from(e: PageError) -> Self {
        match e {
            PageError::Recognition { page, detail } => {
                OcrError::RecognitionFailed { page, detail }
            }
            PageError::Stage { path, detail, .. } => OcrError::ScratchIo {
                path,
                source: std::io::Error::other(detail),
            },
        }
    }
}
