//! Pipeline stages for PDF OCR.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! raster ──▶ dispatch ──▶ assemble
//! (pdfium)   (worker pool) (merge/join)
//! ```
//!
//! 1. [`raster`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 2. [`dispatch`]: fan pages out to at most N concurrent OCR workers and
//!    collect results back in page order via position-indexed slots
//! 3. [`assemble`]: merge single-page PDF fragments, or normalise
//!    ([`normalize`]) and join per-page text with one blank line

pub mod assemble;
pub mod dispatch;
pub mod normalize;
pub mod raster;
