//! Collaborator traits and shared imaging types.
//!
//! The transform talks to four collaborators, each behind its own trait so
//! tests can swap in [`MockBackend`](tests::MockBackend):
//!
//! | Trait | Production implementation |
//! |---|---|
//! | [`DimensionProber`] | [`RustProber`](super::probe::RustProber) |
//! | [`VariantGenerator`] | [`RustBackend`](super::rust_backend::RustBackend) |
//! | [`PlaceholderGenerator`] | [`RustBackend`](super::rust_backend::RustBackend) |
//! | [`VideoConverter`] | [`FfmpegConverter`](super::video::FfmpegConverter) |
//!
//! All four are async. CPU-bound implementations move their work onto
//! `spawn_blocking`; the converter awaits a child process.

use super::probe::RustProber;
use super::rust_backend::RustBackend;
use super::video::FfmpegConverter;
use crate::config::TransformConfig;
use crate::naming::OutputLayout;
use crate::resolve::ResolvedPath;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported input: {0}")]
    Unsupported(String),
    #[error("{operation} timed out after {secs}s")]
    TimedOut { operation: &'static str, secs: u64 },
    #[error("{program} failed: {detail}")]
    Process { program: String, detail: String },
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(e: tokio::task::JoinError) -> Self {
        BackendError::ProcessingFailed(format!("worker task failed: {e}"))
    }
}

/// Detected encoding of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Svg,
    Gif,
    Png,
    Jpeg,
    WebP,
    Avif,
    /// Decodable raster without a dedicated branch (BMP, TIFF, ...).
    Other,
}

impl SourceFormat {
    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Svg => "svg",
            SourceFormat::Gif => "gif",
            SourceFormat::Png => "png",
            SourceFormat::Jpeg => "jpeg",
            SourceFormat::WebP => "webp",
            SourceFormat::Avif => "avif",
            SourceFormat::Other => "other",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoding requested from a [`VariantGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Avif,
    WebP,
    Jpeg,
    Png,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Avif => "avif",
            TargetFormat::WebP => "webp",
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
        }
    }

    /// Value for a `<source type="...">` attribute.
    pub fn mime_type(self) -> &'static str {
        match self {
            TargetFormat::Avif => "image/avif",
            TargetFormat::WebP => "image/webp",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetFormat::Avif => "avif",
            TargetFormat::WebP => "webp",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
        };
        f.write_str(name)
    }
}

/// Result of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
}

/// Responsive variants of one source in one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSet {
    /// `"<url> <w>w"` pairs, ascending by width, joined by `", "`.
    pub srcset: String,
    /// URL of the largest variant.
    pub fallback: String,
}

/// Reads intrinsic size and format of an image file on disk.
#[async_trait]
pub trait DimensionProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<Dimensions, BackendError>;
}

/// Produces resized, re-encoded variants of a site image.
#[async_trait]
pub trait VariantGenerator: Send + Sync {
    async fn generate(
        &self,
        source: &ResolvedPath,
        format: TargetFormat,
    ) -> Result<VariantSet, BackendError>;
}

/// Produces an inline preview URI usable inside CSS `url("...")`.
#[async_trait]
pub trait PlaceholderGenerator: Send + Sync {
    async fn placeholder(&self, source: &ResolvedPath) -> Result<String, BackendError>;
}

/// Transcodes an animated raster into a video and returns its URL.
#[async_trait]
pub trait VideoConverter: Send + Sync {
    async fn convert(&self, source: &ResolvedPath) -> Result<String, BackendError>;
}

/// The set of collaborators one transform runs against.
#[derive(Clone)]
pub struct Backends {
    pub prober: Arc<dyn DimensionProber>,
    pub variants: Arc<dyn VariantGenerator>,
    pub placeholders: Arc<dyn PlaceholderGenerator>,
    pub video: Arc<dyn VideoConverter>,
}

impl Backends {
    /// Production collaborators: pure Rust imaging plus an ffmpeg subprocess.
    pub fn native(config: &TransformConfig) -> Self {
        let layout = OutputLayout::new(&config.output_root, &config.images.output_dir);
        let images = Arc::new(RustBackend::new(layout.clone(), config));
        Self {
            prober: Arc::new(RustProber::new()),
            variants: images.clone(),
            placeholders: images,
            video: Arc::new(FfmpegConverter::new(&config.video.ffmpeg, layout)),
        }
    }
}
