//! # imgdim
//!
//! A build-time post-processor for rendered HTML. It finds every `<img>` and
//! `<amp-img>` whose file lives in the built site and rewrites the markup so
//! the browser gets intrinsic dimensions, modern formats and a placeholder
//! while the real bytes load.
//!
//! # Pipeline
//!
//! Each document goes through two phases:
//!
//! ```text
//! 1. Plan    <img> elements  →  Outcome per image  (probe, choose, generate; concurrent)
//! 2. Apply   Outcomes        →  rewritten DOM      (one element at a time, document order)
//! ```
//!
//! Planning never touches the DOM: every image is described by an owned
//! [`process::ImageRequest`], so images can be worked on concurrently and a
//! failure leaves its element exactly as the author wrote it. Applying is
//! sequential, which keeps sibling insertions from racing each other.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`transform`] | Document entry point: parse, fan out, apply, serialize, report |
//! | [`process`] | Per-image planning: resolve, probe, pick a branch, call the backends |
//! | [`rewrite`] | DOM edits for each branch (`<picture>`, `<video>`, srcset, width/height) |
//! | [`policy`] | Format/tag → handling branch table |
//! | [`resolve`] | `src` classification (external vs. site) and dot-relative resolution |
//! | [`naming`] | Content-hashed output file names, srcset strings, URL layout |
//! | [`imaging`] | Probing, resizing, encoding, placeholders and GIF → MP4 conversion |
//! | [`config`] | `imgdim.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Backends Behind Traits
//!
//! Probing, variant generation, placeholder rendering and video conversion are
//! async traits bundled in [`imaging::Backends`]. The shipped implementations
//! are pure Rust (`image`, `usvg`, `avif-parse`) except video, which shells out
//! to `ffmpeg`. Tests swap in a recording mock and never touch pixels.
//!
//! ## Untouched Means Byte-Identical
//!
//! A document where no element changed is returned exactly as read, not
//! re-serialized. Running the tool over a site with only remote images is a
//! no-op at the byte level.
//!
//! ## Content-Hashed Output
//!
//! Generated files are named after a hash of the source bytes, so two pages
//! referencing the same image share variants and a rebuild after an edit
//! never serves stale pixels under an old name.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod policy;
pub mod process;
pub mod resolve;
pub mod rewrite;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;
