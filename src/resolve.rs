//! Image `src` resolution.
//!
//! Maps the raw `src` of an image element onto a site-relative path that
//! can be looked up under the output root. Remote and inline sources are
//! reported as [`Resolution::External`] and never touch the filesystem.
//!
//! | `src` | Result |
//! |---|---|
//! | `https://cdn/x.png`, `HTTP://...`, `//cdn/x.png`, `data:...` | external |
//! | `./x.png`, `../img/x.png` | resolved against the document's directory, re-rooted at the site root |
//! | `/img/x.png`, `img/x.png` | already site-relative, kept as written |
//!
//! Resolution is pure path arithmetic and cannot fail.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Site-relative, forward-slash path of an image file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(String);

impl ResolvedPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Location of the file under the given output root.
    pub fn on_disk(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Remote URL or inline data; left alone.
    External,
    Site(ResolvedPath),
}

/// True for sources that are not files of this site.
pub fn is_external(src: &str) -> bool {
    const PREFIXES: [&str; 4] = ["http://", "https://", "//", "data:"];
    PREFIXES.iter().any(|prefix| {
        src.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// `src` starting with one or more dots followed by a slash.
fn is_dot_relative(src: &str) -> bool {
    let dots = src.bytes().take_while(|&b| b == b'.').count();
    dots > 0 && src.as_bytes().get(dots) == Some(&b'/')
}

/// Resolve `src` as written in `document` against the site `root`.
pub fn resolve_src(src: &str, document: &Path, root: &Path) -> Resolution {
    if is_external(src) {
        return Resolution::External;
    }
    if !is_dot_relative(src) {
        return Resolution::Site(ResolvedPath(src.to_string()));
    }

    let dir = document.parent().unwrap_or(Path::new(""));
    let target = normalize(&absolute(&dir.join(src)));
    let base = normalize(&absolute(root));

    let segments = relative_segments(&target, &base);
    Resolution::Site(ResolvedPath(format!("/{}", segments.join("/"))))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Segments leading from `base` to `target`, climbing with `..` as needed.
fn relative_segments(target: &Path, base: &Path) -> Vec<String> {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(t, b)| t == b)
        .count();

    let mut segments = vec!["..".to_string(); base.len() - common];
    segments.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    segments
}
