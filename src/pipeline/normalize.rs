//! Text-mode cleanup of raw OCR output.
//!
//! ## Why normalisation is necessary
//!
//! Tesseract's plain-text output carries artefacts that must not leak into
//! the joined document:
//!
//! - A form feed (U+000C) terminating each page's text
//! - Windows-style `\r\n` line endings from some builds
//! - Ragged trailing spaces where layout analysis padded short lines
//! - Long runs of blank lines around sparse regions of the page
//!
//! The pipeline joins pages with exactly one blank line, so each page is
//! scrubbed by 5 cheap, deterministic rules before joining. Each rule is a
//! pure function (`&str → String`) with no shared state and is independently
//! testable.
//!
//! ## Rule order
//!
//! Form feeds go first (a trailing `\f\n` would otherwise survive the edge
//! trim), line endings before per-line trimming, and the edge trim last so
//! it sees the fully collapsed text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to one page's raw OCR text.
///
/// Rules (applied in order):
/// 1. Remove form feeds (Tesseract terminates every page with one)
/// 2. Normalise line endings (CRLF/CR → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive newlines down to 2
/// 5. Trim leading/trailing blank lines of the page
///
/// An empty page stays an empty string; the join separator still marks its
/// position in the document.
pub fn normalize_page_text(input: &str) -> String {
    let s = remove_form_feeds(input);
    let s = normalize_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_page_edges(&s)
}

// ── Rule 1: Remove form feeds ────────────────────────────────────────────────

fn remove_form_feeds(input: &str) -> String {
    input.replace('\u{000C}', "")
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUNS.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Trim page edges ──────────────────────────────────────────────────

fn trim_page_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
