//! Per-image processing: resolve, probe, choose a branch, call collaborators.
//!
//! Works on an owned [`ImageRequest`] snapshot of the element, never on the
//! document itself, so every image of a document can be processed
//! concurrently. The result is an [`Outcome`]: either a [`Rewrite`] plan for
//! the DOM, a deliberate skip, or a failure that leaves the element as
//! written.
//!
//! ## Pipeline
//!
//! ```text
//! src ─┬─ missing/empty ─────────────────────────────→ Skipped(MissingSrc)
//!      ├─ http(s):// // data: ───────────────────────→ Skipped(External)
//!      └─ site path → probe ─┬─ error ───────────────→ Failed
//!                            └─ policy ─┬─ Vector ────→ Size
//!                                       ├─ Animate ───→ convert → Video
//!                                       ├─ Picture ───→ placeholder ∥ avif ∥ webp ∥ fallback → Picture
//!                                       ├─ SrcsetOnly → fallback → Srcset
//!                                       └─ AuthorSrcset → Skipped(AuthorSrcset)
//! ```
//!
//! Every collaborator call is bounded by the configured timeout. A failure
//! in any call fails the whole image (no partial rewrite) and is logged as
//! a warning; it never reaches sibling images.

use crate::config::SizesConfig;
use crate::imaging::{BackendError, Backends};
use crate::policy::{self, Handling, ImageTag};
use crate::resolve::{Resolution, resolve_src};
use crate::rewrite::{PictureSource, Rewrite};
use kuchikiki::ElementData;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Owned snapshot of the attributes that drive the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub tag: ImageTag,
    /// Trimmed `src`; `None` when absent or blank.
    pub src: Option<String>,
    pub class: Option<String>,
    pub has_srcset: bool,
}

impl ImageRequest {
    pub fn from_element(element: &ElementData) -> Self {
        let attrs = element.attributes.borrow();
        let non_empty = |name: &str| {
            attrs
                .get(name)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            tag: ImageTag::from_name(&element.name.local),
            src: non_empty("src"),
            class: attrs.get("class").map(str::to_string),
            has_srcset: non_empty("srcset").is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    External,
    MissingSrc,
    AuthorSrcset,
}

impl SkipReason {
    pub fn name(self) -> &'static str {
        match self {
            SkipReason::External => "external",
            SkipReason::MissingSrc => "missing-src",
            SkipReason::AuthorSrcset => "author-srcset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rewrite(Rewrite),
    Skipped(SkipReason),
    Failed(String),
}

/// Everything an image needs from its document.
pub struct ProcessContext<'a> {
    /// Output path of the HTML document containing the image.
    pub document: &'a Path,
    /// Site output root.
    pub root: &'a Path,
    pub backends: &'a Backends,
    pub sizes: &'a SizesConfig,
    pub timeout: Option<Duration>,
}

/// Run the pipeline for one image. Never fails; errors become
/// [`Outcome::Failed`].
pub async fn process_image(request: &ImageRequest, ctx: &ProcessContext<'_>) -> Outcome {
    match plan(request, ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(
                src = request.src.as_deref().unwrap_or_default(),
                document = %ctx.document.display(),
                error = %e,
                "image left unchanged"
            );
            Outcome::Failed(e.to_string())
        }
    }
}

async fn plan(request: &ImageRequest, ctx: &ProcessContext<'_>) -> Result<Outcome, BackendError> {
    let Some(src) = request.src.as_deref() else {
        return Ok(Outcome::Skipped(SkipReason::MissingSrc));
    };
    let source = match resolve_src(src, ctx.document, ctx.root) {
        Resolution::External => return Ok(Outcome::Skipped(SkipReason::External)),
        Resolution::Site(path) => path,
    };

    let on_disk = source.on_disk(ctx.root);
    let dims = bounded(ctx.timeout, "probe", ctx.backends.prober.probe(&on_disk)).await?;
    let handling = policy::choose(dims.format, &request.tag, request.has_srcset);
    debug!(src, resolved = %source, format = %dims.format, width = dims.width, height = dims.height, branch = handling.name(), "probed");

    let sizes = || ctx.sizes.for_class(request.class.as_deref()).to_string();
    let variants = &ctx.backends.variants;

    let rewrite = match handling {
        Handling::Vector => Rewrite::Size {
            width: dims.width,
            height: dims.height,
        },
        Handling::Animate => {
            let url = bounded(ctx.timeout, "convert", ctx.backends.video.convert(&source)).await?;
            Rewrite::Video {
                src: url,
                element: request.tag.video_element(),
            }
        }
        Handling::Picture { fallback } => {
            let [first, second, third] = policy::picture_formats(fallback);
            let (placeholder, first_set, second_set, third_set) = tokio::try_join!(
                bounded(
                    ctx.timeout,
                    "placeholder",
                    ctx.backends.placeholders.placeholder(&source)
                ),
                bounded(ctx.timeout, "generate", variants.generate(&source, first)),
                bounded(ctx.timeout, "generate", variants.generate(&source, second)),
                bounded(ctx.timeout, "generate", variants.generate(&source, third)),
            )?;
            Rewrite::Picture {
                width: dims.width,
                height: dims.height,
                placeholder,
                sizes: sizes(),
                fallback_src: third_set.fallback,
                sources: vec![
                    PictureSource {
                        format: first,
                        srcset: first_set.srcset,
                    },
                    PictureSource {
                        format: second,
                        srcset: second_set.srcset,
                    },
                    PictureSource {
                        format: third,
                        srcset: third_set.srcset,
                    },
                ],
            }
        }
        Handling::SrcsetOnly { fallback } => {
            let set = bounded(ctx.timeout, "generate", variants.generate(&source, fallback)).await?;
            Rewrite::Srcset {
                width: dims.width,
                height: dims.height,
                srcset: set.srcset,
                sizes: sizes(),
                fallback_src: set.fallback,
            }
        }
        Handling::AuthorSrcset => return Ok(Outcome::Skipped(SkipReason::AuthorSrcset)),
    };
    Ok(Outcome::Rewrite(rewrite))
}

/// Await `fut`, failing with [`BackendError::TimedOut`] past `limit`.
async fn bounded<T>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| BackendError::TimedOut {
                operation,
                secs: limit.as_secs(),
            })?,
    }
}
