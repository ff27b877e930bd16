//! Per-image handling decision.
//!
//! The branch an image takes is a pure function of its detected format,
//! its tag, and whether the author already supplied a `srcset`:
//!
//! | format | tag | `srcset` | branch |
//! |---|---|---|---|
//! | svg | any | any | [`Handling::Vector`] |
//! | gif | any | any | [`Handling::Animate`] |
//! | raster | `img` | any | [`Handling::Picture`] |
//! | raster | other | absent | [`Handling::SrcsetOnly`] |
//! | raster | other | present | [`Handling::AuthorSrcset`] |

use crate::imaging::{SourceFormat, TargetFormat};

/// Tag of an image element, as far as the policy cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTag {
    Img,
    /// Any other image-bearing element, e.g. `amp-img`. Stored lowercase.
    Other(String),
}

impl ImageTag {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("img") {
            ImageTag::Img
        } else {
            ImageTag::Other(name.to_ascii_lowercase())
        }
    }

    /// AMP components get `amp-video` instead of `video`.
    pub fn is_amp(&self) -> bool {
        match self {
            ImageTag::Img => false,
            ImageTag::Other(name) => name.contains("amp"),
        }
    }

    pub fn video_element(&self) -> &'static str {
        if self.is_amp() { "amp-video" } else { "video" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Resolution independent; only dimensions are added.
    Vector,
    /// Animated raster replaced by an autoplaying video.
    Animate,
    /// `<img>` wrapped in a `<picture>` with avif, webp and fallback sources.
    Picture { fallback: TargetFormat },
    /// Non-`img` element given a fallback-format `srcset` in place.
    SrcsetOnly { fallback: TargetFormat },
    /// Author-provided responsive markup; left alone.
    AuthorSrcset,
}

impl Handling {
    /// Whether `width`/`height` are filled in from the probe (when `width`
    /// is absent).
    pub fn sets_dimensions(self) -> bool {
        matches!(
            self,
            Handling::Vector | Handling::Picture { .. } | Handling::SrcsetOnly { .. }
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Handling::Vector => "vector",
            Handling::Animate => "video",
            Handling::Picture { .. } => "picture",
            Handling::SrcsetOnly { .. } => "srcset",
            Handling::AuthorSrcset => "author-srcset",
        }
    }
}

/// PNG keeps PNG (alpha, crisp edges); everything else falls back to JPEG.
pub fn fallback_format(format: SourceFormat) -> TargetFormat {
    match format {
        SourceFormat::Png => TargetFormat::Png,
        _ => TargetFormat::Jpeg,
    }
}

/// `<source>` order inside a picture: most to least efficient.
pub fn picture_formats(fallback: TargetFormat) -> [TargetFormat; 3] {
    [TargetFormat::Avif, TargetFormat::WebP, fallback]
}

pub fn choose(format: SourceFormat, tag: &ImageTag, has_srcset: bool) -> Handling {
    match (format, tag, has_srcset) {
        (SourceFormat::Svg, _, _) => Handling::Vector,
        (SourceFormat::Gif, _, _) => Handling::Animate,
        (_, ImageTag::Img, _) => Handling::Picture {
            fallback: fallback_format(format),
        },
        (_, ImageTag::Other(_), false) => Handling::SrcsetOnly {
            fallback: fallback_format(format),
        },
        (_, ImageTag::Other(_), true) => Handling::AuthorSrcset,
    }
}
