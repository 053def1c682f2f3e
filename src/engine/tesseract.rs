//! Tesseract CLI engine.
//!
//! Invokes the `tesseract` binary once per page image. Output files are
//! written beside the input image (`page-0001.png` → `page-0001.txt` or
//! `page-0001.pdf`) inside the job scratch directory, so they vanish with
//! the job; this module never deletes anything itself.

use super::{EngineError, OcrEngine};
use crate::output::{OutputMode, RecognizedPage};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// OCR engine backed by the Tesseract command-line tool.
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
}

impl TesseractEngine {
    /// Create an engine using an explicit binary path, the `TESSERACT_PATH`
    /// environment variable, or plain `tesseract` on PATH, in that order.
    pub fn new(binary: Option<PathBuf>, language: impl Into<String>) -> Self {
        let binary = binary
            .or_else(|| std::env::var_os("TESSERACT_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("tesseract"));
        Self {
            binary,
            language: language.into(),
        }
    }

    /// Tesseract wants an output *base*; it appends `.txt` or `.pdf` itself.
    /// Using the image path minus its extension keeps outputs beside the
    /// image with predictable names.
    fn output_base(image: &Path) -> PathBuf {
        image.with_extension("")
    }

    fn run(&self, image: &Path, mode: OutputMode) -> Result<(), EngineError> {
        let base = Self::output_base(image);
        let mut cmd = Command::new(&self.binary);
        cmd.arg(image)
            .arg(&base)
            .arg("-l")
            .arg(&self.language)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg("3");
        if mode == OutputMode::SearchablePdf {
            cmd.arg("pdf");
        }
        debug!(
            "Running {} on {} (mode {})",
            self.binary.display(),
            image.display(),
            mode
        );
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Unavailable(format!("'{}' not found", self.binary.display()))
            } else {
                EngineError::Io(e)
            }
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl OcrEngine for TesseractEngine {
    fn id(&self) -> &'static str {
        "tesseract"
    }

    fn check_available(&self) -> Result<(), EngineError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::Unavailable(format!("'{}' not found", self.binary.display()))
                } else {
                    EngineError::Io(e)
                }
            })?;
        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "'{} --version' exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        // Tesseract prints its version banner to stdout on recent releases
        // and to stderr on old ones.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        debug!(
            "Found {}",
            banner.lines().next().unwrap_or("tesseract").trim()
        );
        Ok(())
    }

    fn recognize(&self, image: &Path, mode: OutputMode) -> Result<RecognizedPage, EngineError> {
        self.run(image, mode)?;
        match mode {
            OutputMode::Text => {
                let path = image.with_extension("txt");
                let text = std::fs::read_to_string(&path)?;
                Ok(RecognizedPage::Text(text))
            }
            OutputMode::SearchablePdf => {
                let path = image.with_extension("pdf");
                let bytes = std::fs::read(&path)?;
                if bytes.is_empty() {
                    return Err(EngineError::Failed(format!(
                        "tesseract wrote an empty PDF at '{}'",
                        path.display()
                    )));
                }
                Ok(RecognizedPage::SearchablePdf(bytes))
            }
        }
    }
}
