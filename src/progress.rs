//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn OcrProgress>`] via
//! [`crate::config::OcrConfigBuilder::progress`] to receive real-time events
//! as the pipeline recognises each page.
//!
//! Callbacks are the least-invasive integration point: callers can forward
//! events to a channel, a WebSocket, or a terminal progress bar without the
//! library knowing anything about how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use ocrpipe::{OcrProgress, OcrConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingProgress {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl OcrProgress for CountingProgress {
//!     fn on_page_done(&self, page_num: usize, total_pages: usize, bytes: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("Page {}/{} done ({} bytes, {} so far)", page_num, total_pages, bytes, done);
//!     }
//! }
//!
//! let counter = Arc::new(CountingProgress {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = OcrConfig::builder()
//!     .progress(counter as Arc<dyn OcrProgress>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as a job moves through its pages.
///
/// Implementations must be `Send + Sync`; page events for one job are
/// delivered from the dispatcher's collector as workers finish, so
/// `on_page_done`/`on_page_failed` arrive in completion order, not page
/// order. All methods have default no-op implementations so callers only
/// override what they care about.
pub trait OcrProgress: Send + Sync {
    /// Called once after rasterisation, when the page count is known.
    fn on_job_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page's worker task is handed to the pool.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page is successfully recognised.
    ///
    /// `bytes` is the size of the page's output (fragment bytes or text
    /// length), useful for progress displays that track volume.
    fn on_page_done(&self, page_num: usize, total_pages: usize, bytes: usize) {
        let _ = (page_num, total_pages, bytes);
    }

    /// Called when a page fails. Under the fail-fast policy this is the
    /// last page event of the job.
    fn on_page_failed(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once when the job leaves the dispatch stage.
    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopOcrProgress;

impl OcrProgress for NoopOcrProgress {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressHandle = Arc<dyn OcrProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingProgress {
        starts: Arc<AtomicUsize>,
        dones: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
        job_total: Arc<AtomicUsize>,
        job_succeeded: Arc<AtomicUsize>,
    }

    impl OcrProgress for TrackingProgress {
        fn on_job_start(&self, total_pages: usize) {
            self.job_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_done(&self, _page_num: usize, _total_pages: usize, _bytes: usize) {
            self.dones.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_failed(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _total_pages: usize, success_count: usize) {
            self.job_succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_progress_does_not_panic() {
        let p = NoopOcrProgress;
        p.on_job_start(5);
        p.on_page_start(1, 5);
        p.on_page_done(1, 5, 42);
        p.on_page_failed(2, 5, "some error");
        p.on_job_complete(5, 4);
    }

    #[test]
    fn tracking_progress_receives_events() {
        let tracker = TrackingProgress {
            starts: Arc::new(AtomicUsize::new(0)),
            dones: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
            job_total: Arc::new(AtomicUsize::new(0)),
            job_succeeded: Arc::new(AtomicUsize::new(0)),
        };

        tracker.on_job_start(3);
        assert_eq!(tracker.job_total.load(Ordering::SeqCst), 3);

        tracker.on_page_start(1, 3);
        tracker.on_page_done(1, 3, 100);
        tracker.on_page_start(2, 3);
        tracker.on_page_done(2, 3, 200);
        tracker.on_page_start(3, 3);
        tracker.on_page_failed(3, 3, "engine crashed");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.dones.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);

        tracker.on_job_complete(3, 2);
        assert_eq!(tracker.job_succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_progress_works() {
        let p: Arc<dyn OcrProgress> = Arc::new(NoopOcrProgress);
        p.on_job_start(10);
        p.on_page_start(1, 10);
        p.on_page_done(1, 10, 512);
    }
}
