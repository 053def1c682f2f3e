//! Configuration types for the OCR pipeline.
//!
//! All pipeline behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. Keeping every knob in one struct makes it trivial to
//! share configs across threads and to diff two runs to understand why their
//! outputs differ.

use crate::engine::OcrEngine;
use crate::error::OcrError;
use crate::progress::OcrProgress;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an OCR pipeline.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use ocrpipe::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .dpi(300)
///     .workers(4)
///     .language("eng")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 300.
    ///
    /// 300 DPI is the standard operating point for OCR: glyph strokes are wide
    /// enough for reliable recognition without ballooning image sizes. Below
    /// 150 accuracy drops sharply on small print; above 400 the images get
    /// slower to render and recognise with little accuracy gain.
    pub dpi: u32,

    /// Worker-pool bound for per-page OCR tasks. Default: `None`.
    ///
    /// `None` sizes the pool from host CPU parallelism once, when the
    /// pipeline is constructed. OCR is CPU-bound, so exceeding the core count
    /// only adds contention. The dispatcher additionally caps the bound by
    /// the page count of each job.
    pub workers: Option<usize>,

    /// Tesseract language code(s), e.g. "eng" or "eng+fra". Default: "eng".
    ///
    /// Combinations require the matching traineddata files to be installed.
    /// Validated on `build()`: only ASCII alphanumerics, `+` and `_` are
    /// accepted, since the value is passed to a subprocess.
    pub language: String,

    /// Path to the `tesseract` binary. Default: `None` (resolve via PATH).
    pub tesseract_binary: Option<PathBuf>,

    /// Root directory for per-job scratch storage. Default: `None`, meaning
    /// the OS temp dir plus an `ocrpipe` component. Each job creates a
    /// uniquely named sub-directory beneath this root and removes it when
    /// the job ends; `cleanup()` purges the whole root.
    pub scratch_root: Option<PathBuf>,

    /// Pre-constructed OCR engine. Takes precedence over the built-in
    /// Tesseract engine; injected engines skip the availability probe.
    pub engine: Option<Arc<dyn OcrEngine>>,

    /// Progress observer invoked at job and page boundaries.
    pub progress: Option<Arc<dyn OcrProgress>>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            workers: None,
            language: "eng".to_string(),
            tesseract_binary: None,
            scratch_root: None,
            engine: None,
            progress: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("dpi", &self.dpi)
            .field("workers", &self.workers)
            .field("language", &self.language)
            .field("tesseract_binary", &self.tesseract_binary)
            .field("scratch_root", &self.scratch_root)
            .field("engine", &self.engine.as_ref().map(|e| e.id()))
            .field("progress", &self.progress.as_ref().map(|_| "<dyn OcrProgress>"))
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// The scratch root this config resolves to.
    pub fn resolved_scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ocrpipe"))
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = Some(n.max(1));
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = Some(path.into());
        self
    }

    pub fn scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(path.into());
        self
    }

    pub fn engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn OcrProgress>) -> Self {
        self.config.progress = Some(progress);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.workers == Some(0) {
            return Err(OcrError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.language.is_empty()
            || !c
                .language
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '+' || ch == '_')
        {
            return Err(OcrError::InvalidConfig(format!(
                "Invalid language '{}': use Tesseract codes like 'eng' or 'eng+fra'",
                c.language
            )));
        }
        Ok(self.config)
    }
}
