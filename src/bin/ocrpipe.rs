//! CLI binary for ocrpipe.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`,
//! runs one job, and writes the artifact.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocrpipe::{Artifact, JobStats, OcrConfig, OcrPipeline, OcrProgress, OutputMode, ProgressHandle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress reporting using indicatif ───────────────────────────────────

/// Terminal progress reporter: renders a live progress bar and per-page log
/// lines using [indicatif]. Works correctly when pages complete out of order.
struct CliProgress {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of pages that errored out.
    errors: AtomicUsize,
}

impl CliProgress {
    /// Create a reporter whose progress-bar length is set dynamically by
    /// `on_job_start` (called once the page count is known).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_job_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }
}

impl OcrProgress for CliProgress {
    fn on_job_start(&self, total_pages: usize) {
        // Switch from spinner-only style to the full bar now that the
        // actual page count is known.
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_done(&self, page_num: usize, total_pages: usize, bytes: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{bytes:>6} B")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_failed(&self, page_num: usize, total_pages: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let mut truncated: String = error.chars().take(79).collect();
            truncated.push('…');
            truncated
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages recognised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages recognised  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Make a scanned PDF searchable (writes document.ocr.pdf)
  ocrpipe document.pdf

  # Choose the output path
  ocrpipe document.pdf -o searchable.pdf

  # Plain text to stdout
  ocrpipe --mode text document.pdf

  # German and English recognition, text to a file
  ocrpipe --mode text --lang deu+eng document.pdf -o document.txt

  # Higher resolution for small print, four workers
  ocrpipe --dpi 400 --workers 4 document.pdf

  # Machine-readable run statistics
  ocrpipe --json document.pdf > stats.json

  # Remove leftovers of crashed runs
  ocrpipe --cleanup

LANGUAGES:
  --lang takes a Tesseract traineddata name, or several joined with '+':
  eng, deu, fra, spa, ita, por, nld, pol, rus, jpn, chi_sim, ...
  Each language pack must be installed, e.g.:
    apt install tesseract-ocr-deu      (Debian/Ubuntu)
    brew install tesseract-lang        (macOS, all languages)

ENVIRONMENT VARIABLES:
  OCRPIPE_MODE            Default output mode (searchable, text)
  OCRPIPE_DPI             Default rasterisation DPI
  OCRPIPE_WORKERS         Default worker count
  OCRPIPE_LANG            Default recognition language(s)
  OCRPIPE_SCRATCH         Scratch directory for intermediate files
  TESSERACT_PATH          Path to the tesseract binary
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

SETUP:
  1. Install Tesseract:   apt install tesseract-ocr   (or: brew install tesseract)
  2. Run:                 ocrpipe scan.pdf

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/ocrpipe/pdfium-7690/. No manual library setup is required.
  To use an existing pdfium copy: PDFIUM_LIB_PATH=/path/to/libpdfium ocrpipe ...
"#;

/// Turn scanned PDFs into searchable PDFs or plain text.
#[derive(Parser, Debug)]
#[command(
    name = "ocrpipe",
    version,
    about = "Turn scanned PDFs into searchable PDFs or plain text",
    long_about = "Rasterise each page of a scanned PDF, recognise the pages in parallel with \
Tesseract, and reassemble the results in page order: either a searchable PDF whose invisible \
text layer sits on top of the original scan, or a plain-text dump of the whole document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scanned PDF to process.
    #[arg(required_unless_present = "cleanup")]
    input: Option<PathBuf>,

    /// Write the artifact to this file instead of the default location.
    #[arg(short, long, env = "OCRPIPE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output artifact kind.
    #[arg(long, env = "OCRPIPE_MODE", value_enum, default_value = "searchable")]
    mode: ModeArg,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "OCRPIPE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// OCR worker count (default: one per CPU core).
    #[arg(short, long, env = "OCRPIPE_WORKERS")]
    workers: Option<usize>,

    /// Recognition language(s), e.g. eng or deu+eng.
    #[arg(short, long, env = "OCRPIPE_LANG", default_value = "eng")]
    lang: String,

    /// Path to the tesseract binary.
    #[arg(long, env = "TESSERACT_PATH")]
    tesseract: Option<PathBuf>,

    /// Scratch directory for intermediate page images.
    #[arg(long, env = "OCRPIPE_SCRATCH")]
    scratch: Option<PathBuf>,

    /// Print run statistics as JSON to stdout.
    #[arg(long, env = "OCRPIPE_JSON")]
    json: bool,

    /// Purge the scratch directory and exit (no OCR run).
    #[arg(long)]
    cleanup: bool,

    /// Disable the progress bar.
    #[arg(long, env = "OCRPIPE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCRPIPE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCRPIPE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Searchable PDF with an invisible text layer over the scan.
    Searchable,
    /// Plain text, pages joined by one blank line.
    Text,
}

impl From<ModeArg> for OutputMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Searchable => OutputMode::SearchablePdf,
            ModeArg::Text => OutputMode::Text,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs; verbose wins over
    // everything else.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Cleanup mode ─────────────────────────────────────────────────────
    // Purges the shared scratch root without probing Tesseract or PDFium.
    if cli.cleanup {
        let config = OcrConfig {
            scratch_root: cli.scratch.clone(),
            ..OcrConfig::default()
        };
        let root = config.resolved_scratch_root();
        let removed = ocrpipe::purge_scratch(&root)
            .with_context(|| format!("Failed to purge scratch at '{}'", root.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} removed {} scratch entries from {}",
                green("✔"),
                bold(&removed.to_string()),
                root.display()
            );
        }
        return Ok(());
    }

    // ── Ensure the PDFium engine is available ────────────────────────────
    // On the very first run ocrpipe downloads libpdfium (~30 MB) from
    // bblanchon/pdfium-binaries to ~/.cache/ocrpipe/pdfium-{VERSION}/.
    // Later startups skip this block entirely (instant path check only).
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.set_message("Connecting…");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            // block_in_place keeps the closure's borrow of `bar` valid (no
            // 'static bound) while moving the download off the async
            // executor's hot path.
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download the PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            // Quiet mode: download silently; errors still propagate.
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download the PDFium engine")?;
        }
    } else if let Some(lib) = pdfium_auto::cached_pdfium_path() {
        tracing::debug!("PDFium library cached at '{}'", lib.display());
    }

    // ── Read the input document ──────────────────────────────────────────
    let input = cli
        .input
        .clone()
        .context("INPUT is required unless --cleanup is given")?;
    let pdf = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read '{}'", input.display()))?;

    // ── Build the pipeline ───────────────────────────────────────────────
    let progress: Option<ProgressHandle> = if show_progress {
        let cb = CliProgress::new_dynamic();
        Some(cb as Arc<dyn OcrProgress>)
    } else {
        None
    };

    let config = build_config(&cli, progress)?;
    let pipeline =
        OcrPipeline::new(config).context("Failed to initialise the OCR pipeline")?;

    // ── Run the job ──────────────────────────────────────────────────────
    let output = pipeline
        .run(&pdf, cli.mode.into())
        .await
        .context("OCR failed")?;

    match output.artifact {
        Artifact::SearchablePdf(ref bytes) => {
            let out_path = cli
                .output
                .clone()
                .unwrap_or_else(|| input.with_extension("ocr.pdf"));
            write_atomic(&out_path, bytes)
                .with_context(|| format!("Failed to write '{}'", out_path.display()))?;

            if !cli.quiet && !cli.json {
                eprintln!(
                    "{}  {} pages  {}ms  →  {}",
                    green("✔"),
                    output.stats.pages,
                    output.stats.total_ms,
                    bold(&out_path.display().to_string()),
                );
            }
            if cli.json {
                print_json(&output.stats, Some(&out_path), None)?;
            }
        }
        Artifact::Text(ref text) => {
            if let Some(ref out_path) = cli.output {
                write_atomic(out_path, text.as_bytes())
                    .with_context(|| format!("Failed to write '{}'", out_path.display()))?;

                if !cli.quiet && !cli.json {
                    eprintln!(
                        "{}  {} pages  {}ms  →  {}",
                        green("✔"),
                        output.stats.pages,
                        output.stats.total_ms,
                        bold(&out_path.display().to_string()),
                    );
                }
                if cli.json {
                    print_json(&output.stats, Some(out_path), None)?;
                }
            } else if cli.json {
                // Without -o the recognised text rides along in the JSON.
                print_json(&output.stats, None, Some(text))?;
            } else {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(text.as_bytes())
                    .context("Failed to write to stdout")?;
                // Ensure a trailing newline on stdout.
                if !text.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }

                if !cli.quiet && !show_progress {
                    eprintln!(
                        "Recognised {} pages in {}ms",
                        output.stats.pages, output.stats.total_ms
                    );
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressHandle>) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder().dpi(cli.dpi).language(cli.lang.clone());

    if let Some(n) = cli.workers {
        builder = builder.workers(n);
    }
    if let Some(ref path) = cli.tesseract {
        builder = builder.tesseract_binary(path.clone());
    }
    if let Some(ref dir) = cli.scratch {
        builder = builder.scratch_root(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Print run statistics (and optionally the output path or the recognised
/// text) as pretty JSON on stdout.
fn print_json(stats: &JobStats, output: Option<&Path>, text: Option<&str>) -> Result<()> {
    let mut doc = serde_json::json!({ "stats": stats });
    if let Some(path) = output {
        doc["output"] = serde_json::json!(path.display().to_string());
    }
    if let Some(text) = text {
        doc["text"] = serde_json::json!(text);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&doc).context("Failed to serialise stats")?
    );
    Ok(())
}

/// Write `bytes` to `path` atomically: temp file in the target directory,
/// then rename into place. Readers never observe a half-written artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
