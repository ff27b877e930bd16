//! Encoder parameters.
//!
//! Which *format* a variant uses is decided by the handling policy; how hard
//! each encoder works is configured here.
//!
//! - [`Quality`]: lossy encoding quality (1-100, default 90). Clamped on construction.
//! - [`EncodeSettings`]: per-format knobs handed to the variant generator.

use super::backend::TargetFormat;
use crate::config::QualityConfig;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// How one target format is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// rav1e with the given speed (1-10) and quality.
    Avif { speed: u8, quality: Quality },
    /// Lossy JPEG; alpha is flattened.
    Jpeg { quality: Quality },
    /// Lossless WebP.
    WebP,
    /// Lossless PNG.
    Png,
}

/// Encoder settings for every target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub avif: Quality,
    pub avif_speed: u8,
    pub jpeg: Quality,
}

impl EncodeSettings {
    pub fn from_config(config: &QualityConfig) -> Self {
        Self {
            avif: Quality::new(config.avif),
            avif_speed: config.avif_speed.clamp(1, 10),
            jpeg: Quality::new(config.jpeg),
        }
    }

    pub fn encoding(&self, format: TargetFormat) -> Encoding {
        match format {
            TargetFormat::Avif => Encoding::Avif {
                speed: self.avif_speed,
                quality: self.avif,
            },
            TargetFormat::Jpeg => Encoding::Jpeg { quality: self.jpeg },
            TargetFormat::WebP => Encoding::WebP,
            TargetFormat::Png => Encoding::Png,
        }
    }
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self::from_config(&QualityConfig::default())
    }
}
