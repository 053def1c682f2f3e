//! Job orchestration: the end-to-end OCR driver.
//!
//! [`OcrPipeline`] owns the pieces that outlive any single job: the
//! injected OCR engine, the worker-pool bound (sized once at construction),
//! and the scratch root. Each call to [`OcrPipeline::run`] is one job: it
//! stages the input into a uniquely named scratch sub-directory, walks the
//! stages strictly in order, and removes that directory on every exit path,
//! success, failure, or panic.

use crate::config::OcrConfig;
use crate::engine::{OcrEngine, TesseractEngine};
use crate::error::OcrError;
use crate::output::{Artifact, JobStats, OcrOutput, OutputMode};
use crate::pipeline::{assemble, dispatch, raster};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{info, warn};

/// Lifecycle states of one job.
///
/// Transitions are strictly sequential; any stage error moves the job
/// directly to `Failed` with the originating error preserved. Every
/// transition is logged with the job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Rasterizing,
    Dispatching,
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Received => "received",
            JobState::Rasterizing => "rasterizing",
            JobState::Dispatching => "dispatching",
            JobState::Assembling => "assembling",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

fn transition(job_id: &str, state: JobState) {
    info!("Job {}: state → {}", job_id, state);
}

/// A reusable OCR pipeline.
///
/// Construct once, run many jobs. Construction resolves the engine (probing
/// the Tesseract binary unless one was injected), sizes the worker pool from
/// host CPU parallelism, and creates the scratch root.
///
/// # Example
/// ```rust,no_run
/// use ocrpipe::{OcrConfig, OcrPipeline};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.pdf")?;
/// let pipeline = OcrPipeline::new(OcrConfig::default())?;
/// let text = pipeline.extract_text(&bytes).await?;
/// println!("{}", text);
/// # Ok(())
/// # }
/// ```
pub struct OcrPipeline {
    config: OcrConfig,
    engine: Arc<dyn OcrEngine>,
    workers: usize,
    scratch_root: PathBuf,
}

impl OcrPipeline {
    /// Build a pipeline from `config`.
    ///
    /// Fails early with [`OcrError::EngineUnavailable`] when no engine was
    /// injected and the Tesseract binary cannot be probed, and with
    /// [`OcrError::ScratchIo`] when the scratch root cannot be created.
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let engine: Arc<dyn OcrEngine> = match config.engine {
            // Injected engines are the caller's responsibility; no probe.
            Some(ref engine) => Arc::clone(engine),
            None => {
                let tesseract = TesseractEngine::new(
                    config.tesseract_binary.clone(),
                    config.language.clone(),
                );
                tesseract
                    .check_available()
                    .map_err(|e| OcrError::EngineUnavailable {
                        engine: tesseract.id().to_string(),
                        detail: e.to_string(),
                    })?;
                Arc::new(tesseract)
            }
        };

        let workers = config.workers.unwrap_or_else(default_workers);

        let scratch_root = config.resolved_scratch_root();
        std::fs::create_dir_all(&scratch_root).map_err(|e| OcrError::ScratchIo {
            path: scratch_root.clone(),
            source: e,
        })?;

        info!(
            "Pipeline ready: engine {}, {} workers, scratch at '{}'",
            engine.id(),
            workers,
            scratch_root.display()
        );

        Ok(Self {
            config,
            engine,
            workers,
            scratch_root,
        })
    }

    /// Worker-pool bound this pipeline was sized to.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scratch root this pipeline stages jobs under.
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Run one whole job: PDF bytes in, one artifact out.
    ///
    /// Resolves only when the job has fully completed; there is no partial
    /// output and no mid-job cancellation. On a page failure the dispatcher
    /// drains running workers before the scratch directory is removed.
    /// Dropping the returned future still abandons in-flight page work;
    /// whatever those tasks leave in scratch is swept by the next
    /// `cleanup()`.
    pub async fn run(&self, pdf: &[u8], mode: OutputMode) -> Result<OcrOutput, OcrError> {
        let total_start = Instant::now();

        // The magic check runs before any scratch is allocated, so garbage
        // input leaves nothing behind and spawns no workers.
        validate_pdf_magic(pdf)?;

        let job = self.create_job_dir()?;
        let job_id = job_name(&job);
        transition(&job_id, JobState::Received);
        info!(
            "Job {}: {} byte input, mode {}, dpi {}",
            job_id,
            pdf.len(),
            mode,
            self.config.dpi
        );

        let result = self.run_stages(&job, &job_id, pdf, mode, total_start).await;
        match &result {
            Ok(output) => {
                transition(&job_id, JobState::Done);
                info!(
                    "Job {}: complete, {} pages in {}ms",
                    job_id, output.stats.pages, output.stats.total_ms
                );
            }
            Err(e) => {
                transition(&job_id, JobState::Failed);
                warn!("Job {}: {}", job_id, e);
            }
        }
        // `job` drops here, removing the scratch directory on both paths.
        result
    }

    async fn run_stages(
        &self,
        job: &TempDir,
        job_id: &str,
        pdf: &[u8],
        mode: OutputMode,
        total_start: Instant,
    ) -> Result<OcrOutput, OcrError> {
        // ── Step 1: Stage the input ──────────────────────────────────────
        let input_path = job.path().join("input.pdf");
        tokio::fs::write(&input_path, pdf)
            .await
            .map_err(|e| OcrError::ScratchIo {
                path: input_path.clone(),
                source: e,
            })?;

        // ── Step 2: Rasterise ────────────────────────────────────────────
        transition(job_id, JobState::Rasterizing);
        let raster_start = Instant::now();
        let pages = raster::rasterize(&input_path, self.config.dpi).await?;
        let raster_ms = raster_start.elapsed().as_millis() as u64;
        let total_pages = pages.len();
        info!(
            "Job {}: rasterised {} pages in {}ms",
            job_id, total_pages, raster_ms
        );

        if let Some(ref cb) = self.config.progress {
            cb.on_job_start(total_pages);
        }

        // ── Step 3: Dispatch OCR workers ─────────────────────────────────
        transition(job_id, JobState::Dispatching);
        let ocr_start = Instant::now();
        let results = dispatch::dispatch(
            Arc::clone(&self.engine),
            pages,
            mode,
            self.workers,
            job.path(),
            self.config.progress.clone(),
        )
        .await?;
        let ocr_ms = ocr_start.elapsed().as_millis() as u64;
        info!(
            "Job {}: recognised {} pages in {}ms",
            job_id,
            results.len(),
            ocr_ms
        );

        if let Some(ref cb) = self.config.progress {
            cb.on_job_complete(total_pages, results.len());
        }

        // ── Step 4: Assemble the artifact ────────────────────────────────
        transition(job_id, JobState::Assembling);
        let assemble_start = Instant::now();
        let artifact = tokio::task::spawn_blocking(move || assemble::assemble(results, mode))
            .await
            .map_err(|e| OcrError::Internal(format!("Assemble task panicked: {}", e)))??;
        let assemble_ms = assemble_start.elapsed().as_millis() as u64;

        // ── Step 5: Stats ────────────────────────────────────────────────
        let stats = JobStats {
            pages: total_pages,
            workers: self.workers.min(total_pages).max(1),
            dpi: self.config.dpi,
            raster_ms,
            ocr_ms,
            assemble_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };

        Ok(OcrOutput { artifact, stats })
    }

    /// Convert scanned PDF bytes into a searchable PDF.
    pub async fn convert_to_searchable(&self, pdf: &[u8]) -> Result<Vec<u8>, OcrError> {
        let output = self.run(pdf, OutputMode::SearchablePdf).await?;
        match output.artifact {
            Artifact::SearchablePdf(bytes) => Ok(bytes),
            Artifact::Text(_) => Err(OcrError::Internal(
                "searchable-pdf job produced a text artifact".to_string(),
            )),
        }
    }

    /// Extract the recognised plain text of scanned PDF bytes.
    ///
    /// Pages are joined with one blank line; an empty page contributes an
    /// empty string but keeps its separator position.
    pub async fn extract_text(&self, pdf: &[u8]) -> Result<String, OcrError> {
        let output = self.run(pdf, OutputMode::Text).await?;
        match output.artifact {
            Artifact::Text(text) => Ok(text),
            Artifact::SearchablePdf(_) => Err(OcrError::Internal(
                "text job produced a PDF artifact".to_string(),
            )),
        }
    }

    /// Purge every entry under the scratch root, returning how many were
    /// removed.
    ///
    /// Housekeeping for leftovers of crashed processes. Nothing tracks which
    /// entries belong to live jobs, so calling this while jobs are in flight
    /// rips scratch out from under them.
    pub fn cleanup(&self) -> Result<usize, OcrError> {
        purge_scratch(&self.scratch_root)
    }

    fn create_job_dir(&self) -> Result<TempDir, OcrError> {
        tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| OcrError::ScratchIo {
                path: self.scratch_root.clone(),
                source: e,
            })
    }
}

/// One-shot convenience: build a pipeline from `config` and convert.
pub async fn convert_to_searchable(pdf: &[u8], config: &OcrConfig) -> Result<Vec<u8>, OcrError> {
    OcrPipeline::new(config.clone())?.convert_to_searchable(pdf).await
}

/// One-shot convenience: build a pipeline from `config` and extract text.
pub async fn extract_text(pdf: &[u8], config: &OcrConfig) -> Result<String, OcrError> {
    OcrPipeline::new(config.clone())?.extract_text(pdf).await
}

/// Remove every entry under `root`, returning how many were removed.
///
/// A missing root counts as zero. Entries that refuse to go are logged and
/// skipped so one stuck file does not abort the purge.
pub fn purge_scratch(root: &Path) -> Result<usize, OcrError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(OcrError::ScratchIo {
                path: root.to_path_buf(),
                source: e,
            })
        }
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| OcrError::ScratchIo {
            path: root.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let result = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove '{}': {}", path.display(), e),
        }
    }
    Ok(removed)
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn job_name(dir: &TempDir) -> String {
    dir.path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}

fn validate_pdf_magic(bytes: &[u8]) -> Result<(), OcrError> {
    if bytes.len() < 4 {
        return Err(OcrError::InvalidDocument {
            detail: format!("input is only {} bytes", bytes.len()),
        });
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[..4]);
    if &magic != b"%PDF" {
        return Err(OcrError::NotAPdf { magic });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_check_accepts_pdf_header() {
        assert!(validate_pdf_magic(b"%PDF-1.7\n...").is_ok());
    }

    #[test]
    fn magic_check_rejects_other_formats() {
        match validate_pdf_magic(b"PK\x03\x04rest-of-a-zip") {
            Err(OcrError::NotAPdf { magic }) => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got: {other:?}"),
        }
    }

    #[test]
    fn magic_check_rejects_tiny_input() {
        assert!(matches!(
            validate_pdf_magic(b""),
            Err(OcrError::InvalidDocument { .. })
        ));
        assert!(matches!(
            validate_pdf_magic(b"%P"),
            Err(OcrError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn purge_counts_files_and_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("stale.pdf"), b"x").unwrap();
        let sub = root.path().join("job-ancient");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("page-0001.png"), b"y").unwrap();

        assert_eq!(purge_scratch(root.path()).unwrap(), 2);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        // Root itself survives the purge.
        assert!(root.path().is_dir());
    }

    #[test]
    fn purge_of_missing_root_is_zero() {
        let root = tempfile::tempdir().unwrap();
        let gone = root.path().join("never-created");
        assert_eq!(purge_scratch(&gone).unwrap(), 0);
    }

    #[test]
    fn job_state_display_names_are_stable() {
        assert_eq!(JobState::Rasterizing.to_string(), "rasterizing");
        assert_eq!(JobState::Failed.to_string(), "failed");
    }
}
