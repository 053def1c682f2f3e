//! Parallel dispatch: fan rasterised pages out to OCR workers.
//!
//! One task per page, at most `worker_bound` in flight at a time
//! (`buffer_unordered` provides the backpressure: page N+bound is not
//! started until a slot frees). Each task runs the engine on a dedicated
//! blocking-pool thread and reports `Result<PageResult, PageError>`.
//!
//! ## Ordering
//!
//! Workers complete in any order. Every completion is written into the
//! pre-allocated slot for its page position, exactly once, so the returned
//! vector is in page order no matter how completions interleave. Sorting
//! after the fact would also work; indexed slots make the "no page lost,
//! none duplicated" invariant checkable.
//!
//! ## Failure policy
//!
//! Fail-fast. The first `PageError` wins: completed results are discarded,
//! pages not yet started are never started (an abort flag short-circuits
//! them before they reach the blocking pool), and the error is promoted to
//! the job level. Workers already running are not abandoned: the
//! dispatcher drains every in-flight task before returning, so no worker
//! is still writing into job scratch when the job tears the directory
//! down. Progress callbacks go quiet once the job has failed; only the
//! first error is reported.

use crate::engine::OcrEngine;
use crate::error::{OcrError, PageError};
use crate::output::{OutputMode, PageResult};
use crate::pipeline::raster::PageImage;
use crate::progress::ProgressHandle;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Run OCR over `pages` with at most `worker_bound` concurrent workers.
///
/// The effective bound is additionally capped by the page count (a 2-page
/// job never occupies more than 2 slots) and is at least 1. Returns results
/// in page order, or the first page's error promoted to [`OcrError`]. On
/// failure, workers already running are drained before the error is
/// returned.
pub async fn dispatch(
    engine: Arc<dyn OcrEngine>,
    pages: Vec<PageImage>,
    mode: OutputMode,
    worker_bound: usize,
    job_dir: &Path,
    progress: Option<ProgressHandle>,
) -> Result<Vec<PageResult>, OcrError> {
    let total = pages.len();
    let bound = worker_bound.min(total).max(1);
    debug!("Dispatching {} pages across {} workers", total, bound);

    let mut slots: Vec<Option<PageResult>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    let abort = Arc::new(AtomicBool::new(false));

    let mut completions = stream::iter(pages.into_iter().enumerate().map(|(slot, page)| {
        let engine = Arc::clone(&engine);
        let progress = progress.clone();
        let abort = Arc::clone(&abort);
        let image_path = job_dir.join(format!("page-{:04}.png", page.page_num));
        async move {
            // A page admitted after a failure must not start.
            if abort.load(Ordering::SeqCst) {
                return (slot, None);
            }
            if let Some(ref cb) = progress {
                cb.on_page_start(page.page_num, total);
            }
            let joined = tokio::task::spawn_blocking(move || {
                recognize_blocking(&engine, page, &image_path, mode)
            })
            .await;
            (slot, Some(joined))
        }
    }))
    .buffer_unordered(bound);

    // Drain every admitted page even after a failure. Returning early would
    // leave blocking-pool workers writing into job scratch while the caller
    // removes it.
    let mut first_error: Option<OcrError> = None;
    while let Some((slot, outcome)) = completions.next().await {
        match outcome {
            // Short-circuited by the abort flag; nothing ran for this page.
            None => continue,
            Some(Ok(Ok(page_result))) => {
                if first_error.is_some() {
                    // The job already failed; drained results are dropped.
                    continue;
                }
                if let Some(ref cb) = progress {
                    cb.on_page_done(page_result.page_num, total, page_result.content.len_bytes());
                }
                debug!(
                    "Page {}/{} recognised in {}ms",
                    page_result.page_num, total, page_result.duration_ms
                );
                // Each slot is written exactly once: one task per page.
                slots[slot] = Some(page_result);
            }
            Some(Ok(Err(page_error))) => {
                abort.store(true, Ordering::SeqCst);
                if first_error.is_none() {
                    if let Some(ref cb) = progress {
                        cb.on_page_failed(page_error.page(), total, &page_error.to_string());
                    }
                    warn!("Aborting job: {}", page_error);
                    first_error = Some(page_error.into());
                } else {
                    debug!("Follow-on page failure after abort: {}", page_error);
                }
            }
            Some(Err(join_error)) => {
                abort.store(true, Ordering::SeqCst);
                if first_error.is_none() {
                    warn!("Aborting job: worker task panicked: {}", join_error);
                    first_error = Some(OcrError::Internal(format!(
                        "Worker task panicked: {}",
                        join_error
                    )));
                } else {
                    debug!("Follow-on worker panic after abort: {}", join_error);
                }
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    let mut results = Vec::with_capacity(total);
    for (i, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(r) => results.push(r),
            None => {
                return Err(OcrError::Internal(format!(
                    "No result collected for page {}",
                    i + 1
                )))
            }
        }
    }
    Ok(results)
}

/// Worker body: stage the page image as a PNG in job scratch, then hand the
/// file to the engine. Runs on a blocking-pool thread.
fn recognize_blocking(
    engine: &Arc<dyn OcrEngine>,
    page: PageImage,
    image_path: &Path,
    mode: OutputMode,
) -> Result<PageResult, PageError> {
    let started = Instant::now();

    page.image
        .save_with_format(image_path, image::ImageFormat::Png)
        .map_err(|e| PageError::Stage {
            page: page.page_num,
            path: image_path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let content = engine
        .recognize(image_path, mode)
        .map_err(|e| PageError::Recognition {
            page: page.page_num,
            detail: e.to_string(),
        })?;

    Ok(PageResult {
        page_num: page.page_num,
        content,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::output::RecognizedPage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_pages(n: usize) -> Vec<PageImage> {
        (1..=n)
            .map(|page_num| PageImage {
                page_num,
                image: image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                    4,
                    4,
                    image::Rgba([255, 255, 255, 255]),
                )),
            })
            .collect()
    }

    /// 1-based page number recovered from a staged `page-NNNN.png` path.
    fn page_num_of(image: &Path) -> usize {
        image
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("page-"))
            .and_then(|s| s.parse().ok())
            .expect("staged image path should be page-NNNN.png")
    }

    /// Sleeps longest on page 1 so completion order is roughly the reverse
    /// of page order.
    struct SkewedEngine;

    impl OcrEngine for SkewedEngine {
        fn id(&self) -> &'static str {
            "stub"
        }
        fn check_available(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn recognize(
            &self,
            image: &Path,
            _mode: OutputMode,
        ) -> Result<RecognizedPage, EngineError> {
            let n = page_num_of(image);
            std::thread::sleep(Duration::from_millis(100u64.saturating_sub(20 * n as u64)));
            Ok(RecognizedPage::Text(format!("page {}", n)))
        }
    }

    struct FailsOnPage {
        bad_page: usize,
    }

    impl OcrEngine for FailsOnPage {
        fn id(&self) -> &'static str {
            "stub"
        }
        fn check_available(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn recognize(
            &self,
            image: &Path,
            _mode: OutputMode,
        ) -> Result<RecognizedPage, EngineError> {
            let n = page_num_of(image);
            if n == self.bad_page {
                Err(EngineError::Failed("synthetic failure".into()))
            } else {
                Ok(RecognizedPage::Text(format!("page {}", n)))
            }
        }
    }

    /// Fails `bad_page` immediately; every other page sleeps long enough to
    /// still be running when the failure surfaces.
    struct StragglerEngine {
        bad_page: usize,
        started: AtomicUsize,
        running: AtomicUsize,
    }

    impl OcrEngine for StragglerEngine {
        fn id(&self) -> &'static str {
            "stub"
        }
        fn check_available(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn recognize(
            &self,
            image: &Path,
            _mode: OutputMode,
        ) -> Result<RecognizedPage, EngineError> {
            let n = page_num_of(image);
            self.started.fetch_add(1, Ordering::SeqCst);
            self.running.fetch_add(1, Ordering::SeqCst);
            let result = if n == self.bad_page {
                Err(EngineError::Failed("synthetic failure".into()))
            } else {
                std::thread::sleep(Duration::from_millis(150));
                Ok(RecognizedPage::Text(format!("page {}", n)))
            };
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    struct CountingEngine {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl OcrEngine for CountingEngine {
        fn id(&self) -> &'static str {
            "stub"
        }
        fn check_available(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn recognize(
            &self,
            image: &Path,
            _mode: OutputMode,
        ) -> Result<RecognizedPage, EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(15));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RecognizedPage::Text(page_num_of(image).to_string()))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn results_stay_in_page_order_under_reversed_completion() {
        let dir = tempfile::tempdir().unwrap();
        // The worker bound covers all pages, so every delay runs at once and
        // the last page really does complete first.
        let results = dispatch(
            Arc::new(SkewedEngine),
            test_pages(4),
            OutputMode::Text,
            4,
            dir.path(),
            None,
        )
        .await
        .unwrap();

        let texts: Vec<_> = results
            .iter()
            .map(|r| match &r.content {
                RecognizedPage::Text(t) => t.clone(),
                other => panic!("unexpected content: {:?}", other),
            })
            .collect();
        assert_eq!(texts, ["page 1", "page 2", "page 3", "page 4"]);
        assert_eq!(
            results.iter().map(|r| r.page_num).collect::<Vec<_>>(),
            [1, 2, 3, 4]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_page_failure_fails_the_whole_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let err = dispatch(
            Arc::new(FailsOnPage { bad_page: 2 }),
            test_pages(3),
            OutputMode::Text,
            2,
            dir.path(),
            None,
        )
        .await
        .unwrap_err();

        match err {
            OcrError::RecognitionFailed { page, detail } => {
                assert_eq!(page, 2);
                assert!(detail.contains("synthetic failure"), "got: {detail}");
            }
            other => panic!("expected RecognitionFailed, got: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_drains_running_workers_and_starts_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(StragglerEngine {
            bad_page: 1,
            started: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        });
        let err = dispatch(
            Arc::clone(&engine) as Arc<dyn OcrEngine>,
            test_pages(4),
            OutputMode::Text,
            2,
            dir.path(),
            None,
        )
        .await
        .unwrap_err();

        match err {
            OcrError::RecognitionFailed { page, .. } => assert_eq!(page, 1),
            other => panic!("expected RecognitionFailed, got: {other}"),
        }
        // The error must not surface while a sibling worker is still
        // writing into job scratch.
        assert_eq!(engine.running.load(Ordering::SeqCst), 0);
        // Pages queued behind the failure never reach the engine.
        assert!(
            engine.started.load(Ordering::SeqCst) <= 2,
            "{} pages reached the engine",
            engine.started.load(Ordering::SeqCst)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_flight_workers_never_exceed_the_bound() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(CountingEngine {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });
        let results = dispatch(
            Arc::clone(&engine) as Arc<dyn OcrEngine>,
            test_pages(8),
            OutputMode::Text,
            2,
            dir.path(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 8);
        assert!(
            engine.max_seen.load(Ordering::SeqCst) <= 2,
            "observed {} concurrent workers",
            engine.max_seen.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn empty_page_list_yields_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let results = dispatch(
            Arc::new(SkewedEngine),
            Vec::new(),
            OutputMode::Text,
            4,
            dir.path(),
            None,
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }
}
