//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Pixel sizing
//!
//! PDF pages are measured in points (1/72 inch). Each page's pixel width is
//! `points / 72 × dpi`; only the width is passed to pdfium, which scales the
//! height to preserve the page's aspect ratio, so both axes come out at the
//! requested DPI.

use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// One rasterised page, tagged with its 1-based position.
///
/// Produced by [`rasterize`] in document order; consumed exactly once by a
/// worker task and never persisted beyond the job.
#[derive(Debug)]
pub struct PageImage {
    pub page_num: usize,
    pub image: DynamicImage,
}

/// Rasterise every page of a PDF into images, in document order.
///
/// Fails with [`OcrError::InvalidDocument`] if the file cannot be opened as
/// a PDF or has no pages, and with [`OcrError::RasterizeFailed`] if any page
/// refuses to render. A failed page aborts the whole call; skipping it would
/// silently corrupt the output ordering downstream.
pub async fn rasterize(pdf_path: &Path, dpi: u32) -> Result<Vec<PageImage>, OcrError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || rasterize_blocking(&path, dpi))
        .await
        .map_err(|e| OcrError::Internal(format!("Rasterize task panicked: {}", e)))?
}

/// Blocking implementation of page rasterisation.
fn rasterize_blocking(pdf_path: &Path, dpi: u32) -> Result<Vec<PageImage>, OcrError> {
    let pdfium =
        pdfium_auto::bind_pdfium_silent().map_err(|e| OcrError::PdfiumBindingFailed(e.to_string()))?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            OcrError::InvalidDocument {
                detail: "document is password protected".to_string(),
            }
        } else {
            OcrError::InvalidDocument { detail: err_str }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(OcrError::InvalidDocument {
            detail: "document has no pages".to_string(),
        });
    }
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page = pages.get(idx as u16).map_err(|e| OcrError::RasterizeFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;

        let width_px = (page.width().value * dpi as f32 / 72.0).round().max(1.0) as i32;
        let render_config = PdfRenderConfig::new().set_target_width(width_px);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| OcrError::RasterizeFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

        let image = bitmap.as_image();
        debug!(
            "Rasterised page {} → {}x{} px at {} DPI",
            idx + 1,
            image.width(),
            image.height(),
            dpi
        );

        results.push(PageImage {
            page_num: idx + 1,
            image,
        });
    }

    Ok(results)
}
