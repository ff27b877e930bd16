//! Whole-document transform.
//!
//! [`Transformer::transform`] takes the rendered text of one page and the
//! path it is about to be written to, and returns the rewritten text:
//!
//! 1. Documents whose path does not end in `.html` are returned as-is.
//! 2. The markup is parsed once and every `img`/`amp-img` present at that
//!    point is collected.
//! 3. Each image is planned independently and concurrently
//!    ([`process_image`]). With `concurrency.max_images` unset all of them
//!    are in flight at once; otherwise at most that many.
//! 4. Once every plan has settled the rewrites are applied to the tree in
//!    document order and the document is serialized once. If nothing
//!    changed the original text is returned byte-for-byte.
//!
//! Per-image failures are recorded in the [`DocumentReport`] and logged;
//! the transform itself always completes.
//!
//! Running the transform twice on its own output is not idempotent: the
//! fallback `<img>` inside a generated `<picture>` is itself a candidate on
//! the next pass.

use crate::config::TransformConfig;
use crate::imaging::Backends;
use crate::process::{ImageRequest, Outcome, ProcessContext, process_image};
use crate::rewrite::{self, Rewrite};
use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use kuchikiki::NodeRef;
use kuchikiki::traits::TendrilSink;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Elements considered images.
const IMAGE_SELECTOR: &str = "img, amp-img";

/// Whether `path` names an HTML document the transform applies to.
pub fn is_html_document(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "html")
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum OutcomeKind {
    Picture,
    Srcset,
    Video,
    /// Dimensions added, markup otherwise kept.
    Sized,
    /// Probed fine but nothing to add (e.g. vector with explicit width).
    Unchanged,
    Skipped { reason: &'static str },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub src: Option<String>,
    #[serde(flatten)]
    pub outcome: OutcomeKind,
}

/// Per-document record of every image and its outcome, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub path: PathBuf,
    pub images: Vec<ImageReport>,
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub pictures: usize,
    pub srcsets: usize,
    pub videos: usize,
    pub sized: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReportSummary {
    pub fn total(&self) -> usize {
        self.pictures
            + self.srcsets
            + self.videos
            + self.sized
            + self.unchanged
            + self.skipped
            + self.failed
    }
}

impl std::ops::AddAssign for ReportSummary {
    fn add_assign(&mut self, other: Self) {
        self.pictures += other.pictures;
        self.srcsets += other.srcsets;
        self.videos += other.videos;
        self.sized += other.sized;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl DocumentReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            images: Vec::new(),
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for image in &self.images {
            match image.outcome {
                OutcomeKind::Picture => summary.pictures += 1,
                OutcomeKind::Srcset => summary.srcsets += 1,
                OutcomeKind::Video => summary.videos += 1,
                OutcomeKind::Sized => summary.sized += 1,
                OutcomeKind::Unchanged => summary.unchanged += 1,
                OutcomeKind::Skipped { .. } => summary.skipped += 1,
                OutcomeKind::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Result of [`Transformer::transform_document`].
#[derive(Debug, Clone)]
pub struct Transformed {
    pub html: String,
    /// False when `html` is the input text untouched.
    pub changed: bool,
    pub report: DocumentReport,
}

impl Transformed {
    fn unchanged(html: &str, report: DocumentReport) -> Self {
        Self {
            html: html.to_string(),
            changed: false,
            report,
        }
    }
}

/// Rewrites image markup in rendered HTML documents.
///
/// Holds no per-document state; one instance can transform any number of
/// documents, concurrently if the caller wishes.
pub struct Transformer {
    config: TransformConfig,
    backends: Backends,
}

impl Transformer {
    /// Transformer with the production collaborators.
    pub fn new(config: TransformConfig) -> Self {
        let backends = Backends::native(&config);
        Self { config, backends }
    }

    pub fn with_backends(config: TransformConfig, backends: Backends) -> Self {
        Self { config, backends }
    }

    /// Transform `html`, about to be written to `output_path`.
    pub async fn transform(&self, html: &str, output_path: &Path) -> String {
        self.transform_document(html, output_path).await.html
    }

    /// Like [`transform`](Self::transform), also returning the per-image
    /// report.
    pub async fn transform_document(&self, html: &str, output_path: &Path) -> Transformed {
        let mut report = DocumentReport::new(output_path);
        if !is_html_document(output_path) {
            return Transformed::unchanged(html, report);
        }

        let document = kuchikiki::parse_html().one(html);
        let (nodes, requests): (Vec<NodeRef>, Vec<ImageRequest>) = match document
            .select(IMAGE_SELECTOR)
        {
            Ok(selection) => selection
                .map(|element| {
                    let request = ImageRequest::from_element(&element);
                    (element.as_node().clone(), request)
                })
                .unzip(),
            Err(()) => (Vec::new(), Vec::new()),
        };
        if requests.is_empty() {
            return Transformed::unchanged(html, report);
        }
        debug!(document = %output_path.display(), images = requests.len(), "transforming");

        let ctx = ProcessContext {
            document: output_path,
            root: &self.config.output_root,
            backends: &self.backends,
            sizes: &self.config.sizes,
            timeout: self.config.concurrency.timeout(),
        };
        let tasks = requests.iter().map(|request| process_image(request, &ctx));
        let outcomes: Vec<Outcome> = match self.config.concurrency.max_images {
            None => join_all(tasks).await,
            Some(limit) => stream::iter(tasks).buffered(limit.max(1)).collect().await,
        };

        let mut changed = false;
        for ((node, request), outcome) in nodes.iter().zip(&requests).zip(outcomes) {
            let kind = match outcome {
                Outcome::Rewrite(plan) => {
                    let applied = rewrite::apply(node, &plan);
                    changed |= applied;
                    outcome_kind(&plan, applied)
                }
                Outcome::Skipped(reason) => OutcomeKind::Skipped {
                    reason: reason.name(),
                },
                Outcome::Failed(message) => OutcomeKind::Failed { message },
            };
            report.images.push(ImageReport {
                src: request.src.clone(),
                outcome: kind,
            });
        }

        let summary = report.summary();
        info!(
            document = %output_path.display(),
            pictures = summary.pictures,
            videos = summary.videos,
            failed = summary.failed,
            "images processed"
        );

        if !changed {
            return Transformed::unchanged(html, report);
        }
        match serialize(&document) {
            Ok(text) => Transformed {
                html: text,
                changed: true,
                report,
            },
            Err(e) => {
                warn!(document = %output_path.display(), error = %e, "serialization failed; keeping original");
                Transformed::unchanged(html, report)
            }
        }
    }
}

fn outcome_kind(plan: &Rewrite, applied: bool) -> OutcomeKind {
    if !applied {
        return OutcomeKind::Unchanged;
    }
    match plan {
        Rewrite::Size { .. } => OutcomeKind::Sized,
        Rewrite::Video { .. } => OutcomeKind::Video,
        Rewrite::Picture { .. } => OutcomeKind::Picture,
        Rewrite::Srcset { .. } => OutcomeKind::Srcset,
    }
}

fn serialize(document: &NodeRef) -> std::io::Result<String> {
    let mut out = Vec::new();
    document.serialize(&mut out)?;
    String::from_utf8(out).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
