//! # ocrpipe
//!
//! Turn scanned PDFs into searchable PDFs, or extract their plain text,
//! with page-parallel OCR.
//!
//! ## Why this crate?
//!
//! A scanned PDF is just pictures of pages: nothing to search, select, or
//! index. This crate rasterises each page via pdfium, runs OCR over the
//! pages concurrently on a CPU-sized worker pool, and reassembles the
//! results in page order: either one searchable PDF whose invisible text
//! layer sits aligned over the page images, or one plain-text document
//! with pages joined by a blank line.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Admit     %PDF magic check, stage into job-scoped scratch
//!  ├─ 2. Raster    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Dispatch  fan out to ≤ N OCR workers, collect by page position
//!  ├─ 4. Assemble  merge PDF fragments, or normalise + join page text
//!  └─ 5. Output    one artifact + timing stats
//! ```
//!
//! A job either fully succeeds or fails with a single classified error;
//! there is no partial output, and job scratch is removed on every exit
//! path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrpipe::{OcrConfig, OcrPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("scan.pdf")?;
//!
//!     // Probes the tesseract binary and sizes the worker pool once.
//!     let pipeline = OcrPipeline::new(OcrConfig::default())?;
//!
//!     let searchable = pipeline.convert_to_searchable(&bytes).await?;
//!     std::fs::write("scan.ocr.pdf", &searchable)?;
//!
//!     let text = pipeline.extract_text(&bytes).await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrpipe` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! ocrpipe = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder};
pub use engine::{EngineError, OcrEngine, TesseractEngine};
pub use error::{OcrError, PageError};
pub use job::{convert_to_searchable, extract_text, purge_scratch, JobState, OcrPipeline};
pub use output::{Artifact, JobStats, OcrOutput, OutputMode, PageResult, RecognizedPage};
pub use progress::{NoopOcrProgress, OcrProgress, ProgressHandle};
