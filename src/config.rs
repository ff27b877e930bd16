//! Transform configuration.
//!
//! Handles loading, validating, and merging `imgdim.toml`. Stock defaults are
//! the base layer; a user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_root = "_site"         # Built site; image src paths resolve against it
//!
//! [images]
//! widths = [320, 640, 1280, 1920]   # Responsive widths (never upscaled)
//! output_dir = "img/remote"         # Where variants/videos land, under output_root
//!
//! [quality]
//! avif = 40                     # AVIF quality (1-100)
//! avif_speed = 6                # rav1e speed (1 = slowest/best, 10 = fastest)
//! jpeg = 60                     # JPEG fallback quality (1-100)
//!
//! [sizes]
//! list_class = "post-list-img"  # class marking list/index images
//! list = "30vw"                 # sizes for list images
//! default = "90vw"              # sizes for everything else
//!
//! [placeholder]
//! max_edge = 16                 # Longer edge of the embedded preview bitmap
//! blur = 0.5                    # feGaussianBlur stdDeviation
//!
//! [video]
//! ffmpeg = "ffmpeg"             # Program used to turn GIFs into MP4
//!
//! [concurrency]
//! # max_images = 8              # Images in flight per document (unset = all at once)
//! timeout_secs = 120            # Per collaborator call; 0 disables
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "imgdim.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Transform configuration loaded from `imgdim.toml`.
///
/// All fields have defaults matching a typical blog layout. Unknown keys are
/// rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Root of the built site. Site-relative `src` values are looked up here.
    pub output_root: PathBuf,
    /// Responsive variant generation.
    pub images: ImagesConfig,
    /// Encoder quality knobs.
    pub quality: QualityConfig,
    /// The `sizes` attribute rule.
    pub sizes: SizesConfig,
    /// Blurred inline preview settings.
    pub placeholder: PlaceholderConfig,
    /// Animated image conversion.
    pub video: VideoConfig,
    /// Fan-out bound and per-call timeout.
    pub concurrency: ConcurrencyConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("_site"),
            images: ImagesConfig::default(),
            quality: QualityConfig::default(),
            sizes: SizesConfig::default(),
            placeholder: PlaceholderConfig::default(),
            video: VideoConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl TransformConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.widths.is_empty() {
            return Err(ConfigError::Validation(
                "images.widths must not be empty".into(),
            ));
        }
        if self.images.widths.contains(&0) {
            return Err(ConfigError::Validation(
                "images.widths values must be non-zero".into(),
            ));
        }
        let dir = self.images.output_dir.trim_matches('/');
        if dir.is_empty() || dir.split('/').any(|segment| segment == "..") {
            return Err(ConfigError::Validation(
                "images.output_dir must be a non-empty path inside output_root".into(),
            ));
        }
        for (key, value) in [("avif", self.quality.avif), ("jpeg", self.quality.jpeg)] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "quality.{key} must be 1-100"
                )));
            }
        }
        if !(1..=10).contains(&self.quality.avif_speed) {
            return Err(ConfigError::Validation(
                "quality.avif_speed must be 1-10".into(),
            ));
        }
        if self.sizes.list.is_empty() || self.sizes.default.is_empty() {
            return Err(ConfigError::Validation(
                "sizes.list and sizes.default must not be empty".into(),
            ));
        }
        if self.placeholder.max_edge == 0 {
            return Err(ConfigError::Validation(
                "placeholder.max_edge must be non-zero".into(),
            ));
        }
        if self.concurrency.max_images == Some(0) {
            return Err(ConfigError::Validation(
                "concurrency.max_images must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Responsive variant generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Pixel widths to generate. Widths above the source width are dropped.
    pub widths: Vec<u32>,
    /// Directory under `output_root` receiving generated files.
    pub output_dir: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            widths: vec![320, 640, 1280, 1920],
            output_dir: "img/remote".to_string(),
        }
    }
}

/// Lossy encoder settings. WebP and PNG variants are lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub avif: u32,
    pub avif_speed: u8,
    pub jpeg: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            avif: 40,
            avif_speed: 6,
            jpeg: 60,
        }
    }
}

/// Two-way `sizes` rule: list images get the narrow value, everything else
/// the wide one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizesConfig {
    /// Exact `class` attribute value that marks a list image.
    pub list_class: String,
    /// `sizes` for list images.
    pub list: String,
    /// `sizes` for all other images.
    pub default: String,
}

impl SizesConfig {
    /// Pick the `sizes` value for an element with the given `class`.
    ///
    /// Only whole-attribute equality counts; `"post-list-img wide"` is not a
    /// list image.
    pub fn for_class(&self, class: Option<&str>) -> &str {
        match class {
            Some(class) if class == self.list_class => &self.list,
            _ => &self.default,
        }
    }
}

impl Default for SizesConfig {
    fn default() -> Self {
        Self {
            list_class: "post-list-img".to_string(),
            list: "30vw".to_string(),
            default: "90vw".to_string(),
        }
    }
}

/// Blurred preview settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaceholderConfig {
    /// Longer edge, in pixels, of the embedded bitmap.
    pub max_edge: u32,
    /// Gaussian blur standard deviation applied by the wrapping SVG.
    pub blur: f32,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            max_edge: 16,
            blur: 0.5,
        }
    }
}

/// Animated image conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Program name or path of the ffmpeg binary.
    pub ffmpeg: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Per-document fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// Maximum images processed at once within one document.
    /// When absent every image of the document is in flight together.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_images: Option<usize>,
    /// Upper bound for a single probe/encode/convert call. `0` disables it.
    pub timeout_secs: u64,
}

impl ConcurrencyConfig {
    /// The per-call timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_images: None,
            timeout_secs: 120,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(TransformConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<TransformConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: TransformConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, falling back to stock defaults when it
/// does not exist.
pub fn load_config(path: &Path) -> Result<TransformConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `imgdim.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgdim configuration
# =====================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Root of the built site. Image src paths resolve against this directory.
output_root = "_site"

# ---------------------------------------------------------------------------
# Responsive variants
# ---------------------------------------------------------------------------
[images]
# Pixel widths generated for every srcset. Widths larger than the source
# are skipped; a source narrower than all of them keeps its own width.
widths = [320, 640, 1280, 1920]

# Directory under output_root receiving variants and converted videos.
output_dir = "img/remote"

# ---------------------------------------------------------------------------
# Encoder quality (WebP and PNG variants are lossless)
# ---------------------------------------------------------------------------
[quality]
avif = 40
# rav1e speed, 1 (slowest, smallest) to 10 (fastest).
avif_speed = 6
jpeg = 60

# ---------------------------------------------------------------------------
# sizes attribute
# ---------------------------------------------------------------------------
[sizes]
# Elements whose class attribute equals this value are list images.
list_class = "post-list-img"
list = "30vw"
default = "90vw"

# ---------------------------------------------------------------------------
# Blurred placeholder
# ---------------------------------------------------------------------------
[placeholder]
# Longer edge of the embedded preview bitmap, in pixels.
max_edge = 16
# Gaussian blur applied on top of the preview.
blur = 0.5

# ---------------------------------------------------------------------------
# GIF to video
# ---------------------------------------------------------------------------
[video]
ffmpeg = "ffmpeg"

# ---------------------------------------------------------------------------
# Concurrency
# ---------------------------------------------------------------------------
[concurrency]
# Images in flight per document. Omit to process every image at once.
# max_images = 8
# Seconds allowed for one probe, encode or conversion call. 0 disables.
timeout_secs = 120
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = TransformConfig::default();
        assert_eq!(config.output_root, PathBuf::from("_site"));
        assert_eq!(config.images.widths, vec![320, 640, 1280, 1920]);
        assert_eq!(config.images.output_dir, "img/remote");
        assert_eq!(config.quality.avif, 40);
        assert_eq!(config.quality.jpeg, 60);
        assert_eq!(config.concurrency.max_images, None);
        assert_eq!(config.concurrency.timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn default_config_is_valid() {
        TransformConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[sizes]
list = "25vw"
"##;
        let config: TransformConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sizes.list, "25vw");
        // Untouched values keep their defaults
        assert_eq!(config.sizes.default, "90vw");
        assert_eq!(config.sizes.list_class, "post-list-img");
        assert_eq!(config.images.widths, vec![320, 640, 1280, 1920]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r##"
[images]
sizes = [800]
"##;
        let result: Result<TransformConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn sizes_rule_matches_whole_class_only() {
        let sizes = SizesConfig::default();
        assert_eq!(sizes.for_class(Some("post-list-img")), "30vw");
        assert_eq!(sizes.for_class(Some("post-list-img wide")), "90vw");
        assert_eq!(sizes.for_class(Some("hero")), "90vw");
        assert_eq!(sizes.for_class(None), "90vw");
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = ConcurrencyConfig {
            max_images: None,
            timeout_secs: 0,
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn validate_rejects_empty_widths() {
        let mut config = TransformConfig::default();
        config.images.widths.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_escaping_output_dir() {
        let mut config = TransformConfig::default();
        config.images.output_dir = "../elsewhere".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_quality() {
        let mut config = TransformConfig::default();
        config.quality.jpeg = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_max_images() {
        let mut config = TransformConfig::default();
        config.concurrency.max_images = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.sizes.default, "90vw");
        assert_eq!(config.images.widths, vec![320, 640, 1280, 1920]);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(DEFAULT_CONFIG_FILE);

        fs::write(
            &config_path,
            r##"
output_root = "public"

[images]
widths = [480, 960]

[concurrency]
max_images = 4
"##,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.output_root, PathBuf::from("public"));
        assert_eq!(config.images.widths, vec![480, 960]);
        assert_eq!(config.concurrency.max_images, Some(4));
        // Unspecified values should be defaults
        assert_eq!(config.images.output_dir, "img/remote");
        assert_eq!(config.concurrency.timeout_secs, 120);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        let result = load_config(&config_path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_invalid_values_is_error() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&config_path, "[quality]\navif = 101\n").unwrap();

        let result = load_config(&config_path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: TransformConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = TransformConfig::default();
        assert_eq!(config.images.widths, defaults.images.widths);
        assert_eq!(config.sizes.list_class, defaults.sizes.list_class);
        assert_eq!(config.quality.avif_speed, defaults.quality.avif_speed);
        assert_eq!(config.concurrency.max_images, None);
    }
}
