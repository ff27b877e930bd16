//! Output file naming for generated images and videos.
//!
//! Every generated file is named after the content hash of its source, so
//! two pages embedding the same picture share one set of variants and a
//! renamed source keeps its URLs:
//!
//! - `<hash>-<width>.<ext>` for responsive variants (`3f2a9c...-640.avif`)
//! - `<hash>.mp4` for converted animations
//!
//! `<hash>` is the first 16 hex digits of the SHA-256 of the source bytes.
//! Files land in `<output_root>/<output_dir>/` and are referenced from HTML
//! as `/<output_dir>/<file>`.

use crate::imaging::TargetFormat;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const HASH_LEN: usize = 16;

/// Truncated SHA-256 of `bytes` as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..HASH_LEN].to_string()
}

pub fn variant_file_name(hash: &str, width: u32, format: TargetFormat) -> String {
    format!("{hash}-{width}.{}", format.extension())
}

pub fn video_file_name(hash: &str) -> String {
    format!("{hash}.mp4")
}

/// Join `(url, width)` pairs into a `srcset` value.
pub fn format_srcset(entries: &[(String, u32)]) -> String {
    entries
        .iter()
        .map(|(url, width)| format!("{url} {width}w"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where generated files are written and how they are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    dir: String,
}

impl OutputLayout {
    pub fn new(root: &Path, dir: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: dir.trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving generated files.
    pub fn dir_path(&self) -> PathBuf {
        self.dir
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir_path().join(file_name)
    }

    /// Site-absolute URL of a generated file.
    pub fn url(&self, file_name: &str) -> String {
        format!("/{}/{file_name}", self.dir)
    }
}
