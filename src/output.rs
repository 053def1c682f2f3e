//! Result types produced by the pipeline.
//!
//! A job flows through three shapes: each worker emits a [`PageResult`]
//! (one page, tagged with its position), the assembler folds the ordered
//! results into a single [`Artifact`], and the caller receives an
//! [`OcrOutput`] pairing the artifact with timing stats.

use serde::{Deserialize, Serialize};

/// What kind of artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// A searchable PDF: the source page images with an invisible,
    /// position-aligned text layer.
    SearchablePdf,
    /// Plain recognized text, pages joined by a blank line.
    Text,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::SearchablePdf => write!(f, "searchable-pdf"),
            OutputMode::Text => write!(f, "text"),
        }
    }
}

/// What one OCR worker produced for one page.
#[derive(Debug, Clone)]
pub enum RecognizedPage {
    /// A complete single-page PDF with the text layer embedded.
    SearchablePdf(Vec<u8>),
    /// The page's recognized text, possibly empty.
    Text(String),
}

impl RecognizedPage {
    /// Size of this page's output in bytes, for progress reporting.
    pub fn len_bytes(&self) -> usize {
        match self {
            RecognizedPage::SearchablePdf(b) => b.len(),
            RecognizedPage::Text(t) => t.len(),
        }
    }
}

/// One page's OCR result, tagged with its 1-based position.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// 1-based page number in the source document.
    pub page_num: usize,
    pub content: RecognizedPage,
    /// Wall-clock time this page spent in its worker.
    pub duration_ms: u64,
}

/// The single output of a completed job. Intermediates never escape.
#[derive(Debug, Clone)]
pub enum Artifact {
    SearchablePdf(Vec<u8>),
    Text(String),
}

impl Artifact {
    /// Text content, when this is a text artifact.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Artifact::Text(t) => Some(t),
            Artifact::SearchablePdf(_) => None,
        }
    }

    /// PDF bytes, when this is a searchable-PDF artifact.
    pub fn as_pdf_bytes(&self) -> Option<&[u8]> {
        match self {
            Artifact::SearchablePdf(b) => Some(b),
            Artifact::Text(_) => None,
        }
    }
}

/// Timing and sizing summary for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStats {
    pub pages: usize,
    /// Worker-pool bound the dispatcher actually used for this job.
    pub workers: usize,
    pub dpi: u32,
    pub raster_ms: u64,
    pub ocr_ms: u64,
    pub assemble_ms: u64,
    pub total_ms: u64,
}

/// Artifact plus stats, returned by [`crate::OcrPipeline::run`].
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub artifact: Artifact,
    pub stats: JobStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_display_names() {
        assert_eq!(OutputMode::SearchablePdf.to_string(), "searchable-pdf");
        assert_eq!(OutputMode::Text.to_string(), "text");
    }

    #[test]
    fn artifact_accessors_match_arms() {
        let t = Artifact::Text("hello".into());
        assert_eq!(t.as_text(), Some("hello"));
        assert!(t.as_pdf_bytes().is_none());

        let p = Artifact::SearchablePdf(vec![0x25, 0x50, 0x44, 0x46]);
        assert_eq!(p.as_pdf_bytes(), Some(&b"%PDF"[..]));
        assert!(p.as_text().is_none());
    }
}
