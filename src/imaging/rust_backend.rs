//! Pure Rust variant and placeholder generation.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate (pure Rust decoders) |
//! | Decode (AVIF) | `avif-parse` + `rav1d`, decoded to RGB8 |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → JPEG / PNG | `image::codecs::{jpeg, png}` |
//! | Placeholder wrapper | `maud` SVG + `base64` data URI |
//!
//! Each source is decoded once per call; widths are resized and encoded in
//! parallel with rayon, on a blocking worker thread.

use super::avif::decode_avif;
use super::backend::{
    BackendError, PlaceholderGenerator, TargetFormat, VariantGenerator, VariantSet,
};
use super::calculations::{calculate_placeholder_dimensions, calculate_variant_sizes};
use super::params::{EncodeSettings, Encoding};
use super::probe::is_avif;
use crate::config::{PlaceholderConfig, TransformConfig};
use crate::naming::{OutputLayout, format_srcset, hash_bytes, variant_file_name};
use crate::resolve::ResolvedPath;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use maud::html;
use rayon::prelude::*;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Variant and placeholder generator using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone)]
pub struct RustBackend {
    inner: Arc<Settings>,
}

#[derive(Debug)]
struct Settings {
    layout: OutputLayout,
    widths: Vec<u32>,
    encode: EncodeSettings,
    placeholder: PlaceholderConfig,
}

impl RustBackend {
    pub fn new(layout: OutputLayout, config: &TransformConfig) -> Self {
        Self {
            inner: Arc::new(Settings {
                layout,
                widths: config.images.widths.clone(),
                encode: EncodeSettings::from_config(&config.quality),
                placeholder: config.placeholder.clone(),
            }),
        }
    }
}

#[async_trait]
impl VariantGenerator for RustBackend {
    async fn generate(
        &self,
        source: &ResolvedPath,
        format: TargetFormat,
    ) -> Result<VariantSet, BackendError> {
        let settings = self.inner.clone();
        let path = source.on_disk(settings.layout.root());
        tokio::task::spawn_blocking(move || generate_variants(&path, format, &settings)).await?
    }
}

#[async_trait]
impl PlaceholderGenerator for RustBackend {
    async fn placeholder(&self, source: &ResolvedPath) -> Result<String, BackendError> {
        let settings = self.inner.clone();
        let path = source.on_disk(settings.layout.root());
        tokio::task::spawn_blocking(move || render_placeholder(&path, &settings.placeholder))
            .await?
    }
}

/// Read and decode a source, normalized to 8 bits per channel.
fn load_source(path: &Path) -> Result<(Vec<u8>, DynamicImage), BackendError> {
    let bytes = std::fs::read(path)?;
    if is_avif(&bytes) {
        let img = decode_avif(&bytes).map_err(|e| match e {
            BackendError::ProcessingFailed(msg) | BackendError::Unsupported(msg) => {
                BackendError::ProcessingFailed(format!("Failed to decode {}: {msg}", path.display()))
            }
            other => other,
        })?;
        return Ok((bytes, DynamicImage::ImageRgb8(img)));
    }
    let img = image::load_from_memory(&bytes).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to decode {}: {e}", path.display()))
    })?;
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    Ok((bytes, img))
}

fn generate_variants(
    path: &Path,
    format: TargetFormat,
    settings: &Settings,
) -> Result<VariantSet, BackendError> {
    let (bytes, img) = load_source(path)?;
    let hash = hash_bytes(&bytes);
    let encoding = settings.encode.encoding(format);
    let layout = &settings.layout;
    std::fs::create_dir_all(layout.dir_path())?;

    let sizes = calculate_variant_sizes((img.width(), img.height()), &settings.widths);
    let entries = sizes
        .par_iter()
        .map(|size| -> Result<(String, u32), BackendError> {
            let resized = if (size.width, size.height) == (img.width(), img.height()) {
                img.clone()
            } else {
                img.resize_exact(size.width, size.height, FilterType::Lanczos3)
            };
            let name = variant_file_name(&hash, size.width, format);
            save_image(&resized, &layout.file_path(&name), encoding)?;
            Ok((layout.url(&name), size.width))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fallback = entries
        .last()
        .map(|(url, _)| url.clone())
        .ok_or_else(|| BackendError::ProcessingFailed("no variant widths".into()))?;

    Ok(VariantSet {
        srcset: format_srcset(&entries),
        fallback,
    })
}

/// Encode `img` with the given encoding and move it into place at `path`.
///
/// Readers of `path` only ever see a complete file: the bytes go to a temp
/// file in the same directory, which is then renamed over `path`.
fn save_image(img: &DynamicImage, path: &Path, encoding: Encoding) -> Result<(), BackendError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(tmp.as_file());
    let result = match encoding {
        Encoding::Avif { speed, quality } => img.write_with_encoder(
            AvifEncoder::new_with_speed_quality(&mut writer, speed, quality.value() as u8),
        ),
        Encoding::Jpeg { quality } => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(
            JpegEncoder::new_with_quality(&mut writer, quality.value() as u8),
        ),
        Encoding::WebP => img.write_with_encoder(WebPEncoder::new_lossless(&mut writer)),
        Encoding::Png => img.write_with_encoder(PngEncoder::new(&mut writer)),
    };
    result.map_err(|e| {
        BackendError::ProcessingFailed(format!("Encoding {} failed: {e}", path.display()))
    })?;
    writer.flush()?;
    drop(writer);
    tmp.persist(path).map_err(|e| BackendError::Io(e.error))?;
    Ok(())
}

fn render_placeholder(path: &Path, config: &PlaceholderConfig) -> Result<String, BackendError> {
    let (_, img) = load_source(path)?;
    let (w, h) = calculate_placeholder_dimensions((img.width(), img.height()), config.max_edge);
    let tiny = img.resize_exact(w, h, FilterType::Triangle);

    let mut png = Vec::new();
    tiny.write_with_encoder(PngEncoder::new(&mut png))
        .map_err(|e| BackendError::ProcessingFailed(format!("Placeholder encode failed: {e}")))?;

    let svg = placeholder_svg(w, h, &STANDARD.encode(&png), config.blur);
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
}

/// Blurred SVG wrapper around an embedded PNG preview.
fn placeholder_svg(width: u32, height: u32, png_base64: &str, blur: f32) -> String {
    let view_box = format!("0 0 {width} {height}");
    let href = format!("data:image/png;base64,{png_base64}");
    html! {
        svg xmlns="http://www.w3.org/2000/svg" width=(width) height=(height) viewBox=(view_box) preserveAspectRatio="none" {
            filter id="b" color-interpolation-filters="sRGB" {
                feGaussianBlur stdDeviation=(blur) {}
            }
            image width=(width) height=(height) preserveAspectRatio="none" filter="url(#b)" href=(href) {}
        }
    }
    .into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_avif, create_test_jpeg, create_test_png};
    use tempfile::TempDir;

    fn backend(root: &Path, widths: Vec<u32>) -> RustBackend {
        let mut config = TransformConfig::default();
        config.output_root = root.to_path_buf();
        config.images.widths = widths;
        RustBackend::new(OutputLayout::new(root, "img/remote"), &config)
    }

    fn url_to_path(root: &Path, url: &str) -> std::path::PathBuf {
        ResolvedPath::new(url).on_disk(root)
    }

    #[tokio::test]
    async fn png_variants_are_ascending_and_capped_at_source_width() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("a.png"), 700, 350);

        let set = backend(tmp.path(), vec![1280, 320, 640])
            .generate(&ResolvedPath::new("/a.png"), TargetFormat::Png)
            .await
            .unwrap();

        let entries: Vec<&str> = set.srcset.split(", ").collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("/img/remote/") && entries[0].ends_with("-320.png 320w"));
        assert!(entries[1].ends_with("-640.png 640w"));
        assert!(set.fallback.ends_with("-640.png"));

        let (w, h) = image::image_dimensions(url_to_path(tmp.path(), &set.fallback)).unwrap();
        assert_eq!((w, h), (640, 320));
    }

    #[tokio::test]
    async fn small_source_keeps_its_own_width() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("small.jpg"), 200, 100);

        let set = backend(tmp.path(), vec![320, 640])
            .generate(&ResolvedPath::new("/small.jpg"), TargetFormat::Jpeg)
            .await
            .unwrap();

        assert!(set.srcset.ends_with("-200.jpg 200w"));
        assert!(!set.srcset.contains(", "));
        let (w, h) = image::image_dimensions(url_to_path(tmp.path(), &set.fallback)).unwrap();
        assert_eq!((w, h), (200, 100));
    }

    #[tokio::test]
    async fn webp_and_avif_variants_are_written() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("img/b.png"), 64, 48);
        let backend = backend(tmp.path(), vec![32]);
        let source = ResolvedPath::new("/img/b.png");

        for format in [TargetFormat::WebP, TargetFormat::Avif] {
            let set = backend.generate(&source, format).await.unwrap();
            let file = url_to_path(tmp.path(), &set.fallback);
            assert!(file.exists(), "{format} variant missing");
            assert!(std::fs::metadata(&file).unwrap().len() > 0);
            assert!(set.srcset.ends_with(&format!("-32.{} 32w", format.extension())));
        }
    }

    #[tokio::test]
    async fn same_content_shares_file_names() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("one.png"), 40, 40);
        std::fs::copy(tmp.path().join("one.png"), tmp.path().join("two.png")).unwrap();
        let backend = backend(tmp.path(), vec![320]);

        let a = backend
            .generate(&ResolvedPath::new("/one.png"), TargetFormat::Png)
            .await
            .unwrap();
        let b = backend
            .generate(&ResolvedPath::new("/two.png"), TargetFormat::Png)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_source_leave_complete_files() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("a.png"), 700, 350);
        let backend = backend(tmp.path(), vec![320, 640]);
        let source = ResolvedPath::new("/a.png");

        let (a, b) = tokio::join!(
            backend.generate(&source, TargetFormat::Png),
            backend.generate(&source, TargetFormat::Png)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);

        let mut names: Vec<String> = std::fs::read_dir(tmp.path().join("img/remote"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2, "stray files: {names:?}");
        for name in &names {
            let img = image::open(tmp.path().join("img/remote").join(name)).unwrap();
            assert!(name.ends_with(&format!("-{}.png", img.width())), "{name}");
        }
    }

    #[tokio::test]
    async fn missing_source_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = backend(tmp.path(), vec![320])
            .generate(&ResolvedPath::new("/nope.jpg"), TargetFormat::Jpeg)
            .await;
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[tokio::test]
    async fn avif_source_decodes_into_jpeg_variants() {
        let tmp = TempDir::new().unwrap();
        create_test_avif(&tmp.path().join("c.avif"), 64, 48);
        let backend = backend(tmp.path(), vec![320]);

        let set = backend
            .generate(&ResolvedPath::new("/c.avif"), TargetFormat::Jpeg)
            .await
            .unwrap();
        assert!(set.srcset.ends_with("-64.jpg 64w"), "{}", set.srcset);
        let (w, h) = image::image_dimensions(url_to_path(tmp.path(), &set.fallback)).unwrap();
        assert_eq!((w, h), (64, 48));

        let uri = backend
            .placeholder(&ResolvedPath::new("/c.avif"))
            .await
            .unwrap();
        assert!(uri.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn placeholder_is_blurred_svg_data_uri() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("hero.jpg"), 400, 300);

        let uri = backend(tmp.path(), vec![320])
            .placeholder(&ResolvedPath::new("/hero.jpg"))
            .await
            .unwrap();

        let encoded = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"viewBox="0 0 16 12""#));
        assert!(svg.contains("feGaussianBlur"));
        assert!(svg.contains("data:image/png;base64,"));
        // The URI must be embeddable inside url("...")
        assert!(!uri.contains('"'));
    }

    #[test]
    fn placeholder_svg_is_well_formed() {
        let svg = placeholder_svg(16, 9, "AAAA", 0.5);
        assert_eq!(svg.matches("<svg").count(), 1);
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(r#"stdDeviation="0.5""#));
        assert!(svg.contains(r#"href="data:image/png;base64,AAAA""#));
    }
}
