//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Transform
//!
//! One block per document, one line per image in document order:
//!
//! ```text
//! blog/hello/index.html
//!     001 ./hero.jpg → picture
//!     002 /img/spinner.gif → video
//!     003 https://cdn.example.com/x.png → skipped (external)
//!     004 /img/missing.jpg → failed: IO error: No such file or directory
//!
//! Transformed 1 of 3 documents: 1 picture, 0 srcset, 1 video, 0 sized, 1 skipped, 1 failed
//! ```
//!
//! Documents without images are not listed.
//!
//! ## Probe
//!
//! ```text
//! hero.jpg
//!     1600x900 jpeg
//!     <img>: picture (fallback jpeg)
//!     <amp-img>: srcset (fallback jpeg)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::imaging::Dimensions;
use crate::policy::{self, Handling, ImageTag};
use crate::transform::{DocumentReport, OutcomeKind, ReportSummary};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Path shown relative to `root` when it lives under it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn outcome_label(outcome: &OutcomeKind) -> String {
    match outcome {
        OutcomeKind::Picture => "picture".to_string(),
        OutcomeKind::Srcset => "srcset".to_string(),
        OutcomeKind::Video => "video".to_string(),
        OutcomeKind::Sized => "sized".to_string(),
        OutcomeKind::Unchanged => "unchanged".to_string(),
        OutcomeKind::Skipped { reason } => format!("skipped ({reason})"),
        OutcomeKind::Failed { message } => format!("failed: {message}"),
    }
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

// ============================================================================
// Transform output
// ============================================================================

/// Format one document's report. Empty when the document had no images.
pub fn format_document_report(report: &DocumentReport, root: &Path) -> Vec<String> {
    if report.images.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![display_path(&report.path, root)];
    for (i, image) in report.images.iter().enumerate() {
        let src = image.src.as_deref().unwrap_or("(no src)");
        lines.push(format!(
            "{}{} {} \u{2192} {}",
            indent(1),
            format_index(i + 1),
            src,
            outcome_label(&image.outcome)
        ));
    }
    lines
}

pub fn print_document_report(report: &DocumentReport, root: &Path) {
    for line in format_document_report(report, root) {
        println!("{}", line);
    }
}

/// Closing line of a transform run.
pub fn format_run_summary(summary: &ReportSummary, changed: usize, documents: usize) -> String {
    format!(
        "Transformed {} of {}: {}, {} srcset, {}, {} sized, {} skipped, {} failed",
        changed,
        plural(documents, "document", "documents"),
        plural(summary.pictures, "picture", "pictures"),
        summary.srcsets,
        plural(summary.videos, "video", "videos"),
        summary.sized,
        summary.skipped,
        summary.failed
    )
}

pub fn print_run_summary(summary: &ReportSummary, changed: usize, documents: usize) {
    println!();
    println!("{}", format_run_summary(summary, changed, documents));
}

// ============================================================================
// Probe output
// ============================================================================

fn handling_label(handling: Handling) -> String {
    match handling {
        Handling::Picture { fallback } | Handling::SrcsetOnly { fallback } => {
            format!("{} (fallback {})", handling.name(), fallback)
        }
        other => other.name().to_string(),
    }
}

/// Format probe results: dimensions plus the branch each tag would take
/// (assuming no author `srcset`).
pub fn format_probe(path: &Path, dims: &Dimensions) -> Vec<String> {
    let amp = ImageTag::from_name("amp-img");
    vec![
        path.display().to_string(),
        format!("{}{}x{} {}", indent(1), dims.width, dims.height, dims.format),
        format!(
            "{}<img>: {}",
            indent(1),
            handling_label(policy::choose(dims.format, &ImageTag::Img, false))
        ),
        format!(
            "{}<amp-img>: {}",
            indent(1),
            handling_label(policy::choose(dims.format, &amp, false))
        ),
    ]
}

pub fn print_probe(path: &Path, dims: &Dimensions) {
    for line in format_probe(path, dims) {
        println!("{}", line);
    }
}
