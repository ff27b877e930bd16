//! Shared test utilities.
//!
//! Synthetic image writers (every format the prober understands), small
//! DOM helpers for asserting on transformed markup, and a log capture.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! create_test_png(&tmp.path().join("a.png"), 400, 300);
//!
//! let doc = parse(&html);
//! let img = select_one(&doc, "picture > img");
//! assert_eq!(attr(&img, "width").as_deref(), Some("400"));
//! ```

use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage,
};
use kuchikiki::traits::TendrilSink;
use kuchikiki::NodeRef;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
}

fn writer(path: &Path) -> BufWriter<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    BufWriter::new(File::create(path).unwrap())
}

/// Create a small valid PNG (RGBA) with the given dimensions.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    });
    image::codecs::png::PngEncoder::new(writer(path))
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
}

/// Create a small valid JPEG with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    image::codecs::jpeg::JpegEncoder::new(writer(path))
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create a two-frame GIF with the given dimensions.
pub fn create_test_gif(path: &Path, width: u32, height: u32) {
    let first = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
    let second = RgbaImage::from_pixel(width, height, Rgba([0, 0, 255, 255]));
    let mut encoder = image::codecs::gif::GifEncoder::new(writer(path));
    encoder
        .encode_frames(vec![image::Frame::new(first), image::Frame::new(second)])
        .unwrap();
}

/// Create a small valid AVIF through the `image` crate's encoder.
pub fn create_test_avif(path: &Path, width: u32, height: u32) {
    let img = DynamicImage::ImageRgb8(gradient(width, height));
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(writer(path), 10, 80);
    img.write_with_encoder(encoder).unwrap();
}

pub fn write_svg(path: &Path, markup: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, markup).unwrap();
}

// =========================================================================
// DOM helpers: panic with a clear message on miss
// =========================================================================

pub fn parse(html: &str) -> NodeRef {
    kuchikiki::parse_html().one(html)
}

/// All elements matching `selector`.
pub fn select_all(doc: &NodeRef, selector: &str) -> Vec<NodeRef> {
    doc.select(selector)
        .unwrap_or_else(|_| panic!("invalid selector '{selector}'"))
        .map(|el| el.as_node().clone())
        .collect()
}

/// The single element matching `selector`. Panics on zero or several.
pub fn select_one(doc: &NodeRef, selector: &str) -> NodeRef {
    let matches = select_all(doc, selector);
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one '{selector}', found {}",
        matches.len()
    );
    matches.into_iter().next().unwrap()
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element().expect("node is not an element");
    element.attributes.borrow().get(name).map(str::to_string)
}

/// Attribute names of an element, sorted.
pub fn attr_names(node: &NodeRef) -> Vec<String> {
    let element = node.as_element().expect("node is not an element");
    let mut names: Vec<String> = element
        .attributes
        .borrow()
        .map
        .keys()
        .map(|name| name.local.to_string())
        .collect();
    names.sort();
    names
}

pub fn tag_name(node: &NodeRef) -> String {
    node.as_element()
        .expect("node is not an element")
        .name
        .local
        .to_string()
}

// =========================================================================
// Log capture
// =========================================================================

/// Formatted log output collected by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route events of this thread at `WARN` and above into a buffer until the
/// guard is dropped. Pair with a current-thread `#[tokio::test]`.
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}
