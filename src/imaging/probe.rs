//! Dimension probing for site images.
//!
//! | Input | How |
//! |---|---|
//! | SVG (sniffed from content) | `usvg` tree size, rounded up |
//! | AVIF | `avif-parse` container metadata, no decode |
//! | everything else | `image::ImageReader` header read with guessed format |

use super::backend::{BackendError, DimensionProber, Dimensions, SourceFormat};
use async_trait::async_trait;
use image::{ImageFormat, ImageReader};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

/// Prober backed by pure Rust decoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustProber;

impl RustProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DimensionProber for RustProber {
    async fn probe(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || probe_file(&path)).await?
    }
}

/// Blocking probe of a file on disk.
///
/// Rasters are read through a buffered header reader; only SVG and AVIF
/// sources, which need their whole container, are loaded into memory.
pub fn probe_file(path: &Path) -> Result<Dimensions, BackendError> {
    probe_reader(BufReader::new(File::open(path)?)).map_err(|e| match e {
        BackendError::ProcessingFailed(msg) => {
            BackendError::ProcessingFailed(format!("{}: {msg}", path.display()))
        }
        BackendError::Unsupported(msg) => {
            BackendError::Unsupported(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

fn probe_reader(mut reader: BufReader<File>) -> Result<Dimensions, BackendError> {
    let head = reader.fill_buf()?;
    if looks_like_svg(head) || is_avif(head) {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        return probe_bytes(&data);
    }
    probe_raster(ImageReader::new(reader))
}

/// Probe an in-memory image.
pub fn probe_bytes(data: &[u8]) -> Result<Dimensions, BackendError> {
    if looks_like_svg(data) {
        return probe_svg(data);
    }
    if is_avif(data) {
        return probe_avif(data);
    }
    probe_raster(ImageReader::new(Cursor::new(data)))
}

fn probe_raster<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<Dimensions, BackendError> {
    let reader = reader.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| BackendError::Unsupported("unrecognized image format".into()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| BackendError::ProcessingFailed(format!("failed to read dimensions: {e}")))?;

    Ok(Dimensions {
        width,
        height,
        format: source_format(format),
    })
}

fn source_format(format: ImageFormat) -> SourceFormat {
    match format {
        ImageFormat::Png => SourceFormat::Png,
        ImageFormat::Jpeg => SourceFormat::Jpeg,
        ImageFormat::Gif => SourceFormat::Gif,
        ImageFormat::WebP => SourceFormat::WebP,
        ImageFormat::Avif => SourceFormat::Avif,
        _ => SourceFormat::Other,
    }
}

/// Markup starting with `<` that mentions an `<svg` root near the top.
fn looks_like_svg(data: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&data[..data.len().min(4096)]);
    let trimmed = head.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with('<') && head.contains("<svg")
}

/// ISO-BMFF `ftyp` box with an AVIF brand.
pub(crate) fn is_avif(data: &[u8]) -> bool {
    data.len() >= 12 && &data[4..8] == b"ftyp" && matches!(&data[8..12], b"avif" | b"avis")
}

fn probe_svg(data: &[u8]) -> Result<Dimensions, BackendError> {
    let tree = usvg::Tree::from_data(data, &usvg::Options::default())
        .map_err(|e| BackendError::ProcessingFailed(format!("failed to parse SVG: {e}")))?;
    let size = tree.size();
    let width = size.width().ceil() as u32;
    let height = size.height().ceil() as u32;
    if width == 0 || height == 0 {
        return Err(BackendError::ProcessingFailed("SVG has zero size".into()));
    }
    Ok(Dimensions {
        width,
        height,
        format: SourceFormat::Svg,
    })
}

fn probe_avif(data: &[u8]) -> Result<Dimensions, BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(data))
        .map_err(|e| BackendError::ProcessingFailed(format!("failed to parse AVIF: {e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| BackendError::ProcessingFailed(format!("failed to read AVIF metadata: {e:?}")))?;
    Ok(Dimensions {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
        format: SourceFormat::Avif,
    })
}
