//! Image collaborators: probing, variants, placeholders, video.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Probe** | `image` header read, `usvg` for SVG, `avif-parse` for AVIF |
//! | **Variants** | Lanczos3 resize → AVIF / WebP / JPEG / PNG encoders |
//! | **Placeholder** | tiny PNG in a blurred `maud` SVG, base64 data URI |
//! | **Video** | external `ffmpeg` process |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Encoder settings per target format
//! - **AVIF decoding**: `rav1d` AV1 decode for AVIF sources
//! - **Backend**: collaborator traits, [`Backends`] bundle, shared types
//! - **Implementations**: [`RustProber`], [`RustBackend`], [`FfmpegConverter`]

mod avif;
pub mod backend;
mod calculations;
mod params;
pub mod probe;
pub mod rust_backend;
pub mod video;

pub use backend::{
    BackendError, Backends, DimensionProber, Dimensions, PlaceholderGenerator, SourceFormat,
    TargetFormat, VariantGenerator, VariantSet, VideoConverter,
};
pub use calculations::{
    VariantSize, calculate_placeholder_dimensions, calculate_variant_sizes,
    calculate_variant_widths,
};
pub use params::{EncodeSettings, Encoding, Quality};
pub use probe::RustProber;
pub use rust_backend::RustBackend;
pub use video::FfmpegConverter;
