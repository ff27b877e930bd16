//! DOM restructuring for a planned image rewrite.
//!
//! A [`Rewrite`] is computed without touching the document (see
//! [`process`](crate::process)); [`apply`] then performs the mutation on the
//! element's node handle:
//!
//! ```text
//! Size     <img src width height>                       (attributes only)
//! Srcset   <amp-img src srcset sizes width height>      (attributes only)
//! Video    <video|amp-video ...all attrs... src autoplay muted loop aria-label>
//! Picture  <picture>
//!            <source class srcset sizes type="image/avif">
//!            <source class srcset sizes type="image/webp">
//!            <source class srcset sizes type="image/png|jpeg">
//!            <img ... decoding loading style src=fallback width height>
//!          </picture>
//! ```
//!
//! Replacement elements copy every attribute of the original unless the
//! rewrite sets it explicitly. `width`/`height` are only added when `width`
//! is absent, so author-supplied sizes are never overwritten.

use crate::imaging::TargetFormat;
use kuchikiki::{ElementData, NodeRef};

/// One `<source>` of a picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureSource {
    pub format: TargetFormat,
    pub srcset: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Fill in intrinsic dimensions.
    Size { width: u32, height: u32 },
    /// Replace the element with an autoplaying video.
    Video {
        src: String,
        /// `video` or `amp-video`.
        element: &'static str,
    },
    /// Wrap an `<img>` in a multi-format `<picture>`.
    Picture {
        width: u32,
        height: u32,
        placeholder: String,
        sizes: String,
        sources: Vec<PictureSource>,
        fallback_src: String,
    },
    /// Add a single-format `srcset` in place.
    Srcset {
        width: u32,
        height: u32,
        srcset: String,
        sizes: String,
        fallback_src: String,
    },
}

/// Apply `rewrite` to `node`. Returns whether the document changed.
pub fn apply(node: &NodeRef, rewrite: &Rewrite) -> bool {
    let Some(element) = node.as_element() else {
        return false;
    };
    match rewrite {
        Rewrite::Size { width, height } => set_dimensions(element, *width, *height),
        Rewrite::Srcset {
            width,
            height,
            srcset,
            sizes,
            fallback_src,
        } => {
            set_dimensions(element, *width, *height);
            let mut attrs = element.attributes.borrow_mut();
            attrs.insert("srcset", srcset.clone());
            attrs.insert("sizes", sizes.clone());
            attrs.insert("src", fallback_src.clone());
            true
        }
        Rewrite::Video { src, element: tag } => replace_with_video(node, element, src, tag),
        Rewrite::Picture {
            width,
            height,
            placeholder,
            sizes,
            sources,
            fallback_src,
        } => {
            if node.parent().is_none() {
                return false;
            }
            set_dimensions(element, *width, *height);
            let class = {
                let mut attrs = element.attributes.borrow_mut();
                attrs.insert("decoding", "async".to_string());
                attrs.insert("loading", "lazy".to_string());
                attrs.insert(
                    "style",
                    format!(
                        "background-size:cover;background-image:url(\"{placeholder}\")"
                    ),
                );
                attrs.get("class").map(str::to_string)
            };

            let picture = new_sibling_element(element, "picture");
            for source in sources {
                let child = new_sibling_element(element, "source");
                if let Some(child_element) = child.as_element() {
                    let mut attrs = child_element.attributes.borrow_mut();
                    if let Some(class) = &class {
                        attrs.insert("class", class.clone());
                    }
                    attrs.insert("srcset", source.srcset.clone());
                    attrs.insert("sizes", sizes.clone());
                    attrs.insert("type", source.format.mime_type().to_string());
                }
                picture.append(child);
            }

            node.insert_before(picture.clone());
            node.detach();
            picture.append(node.clone());
            element
                .attributes
                .borrow_mut()
                .insert("src", fallback_src.clone());
            true
        }
    }
}

/// Set `width`/`height` unless `width` is already present.
fn set_dimensions(element: &ElementData, width: u32, height: u32) -> bool {
    let mut attrs = element.attributes.borrow_mut();
    if attrs.get("width").is_some_and(|w| !w.is_empty()) {
        return false;
    }
    attrs.insert("width", width.to_string());
    attrs.insert("height", height.to_string());
    true
}

/// Empty element in the same namespace as `like`.
fn new_sibling_element(like: &ElementData, local: &str) -> NodeRef {
    let mut name = like.name.clone();
    name.local = local.into();
    NodeRef::new_element(name, std::iter::empty())
}

fn replace_with_video(node: &NodeRef, element: &ElementData, src: &str, tag: &str) -> bool {
    if node.parent().is_none() {
        return false;
    }
    let mut name = element.name.clone();
    name.local = tag.into();
    let video = NodeRef::new_element(name, element.attributes.borrow().map.clone());

    if let Some(video_element) = video.as_element() {
        let mut attrs = video_element.attributes.borrow_mut();
        attrs.insert("src", src.to_string());
        for flag in ["autoplay", "muted", "loop"] {
            attrs.insert(flag, String::new());
        }
        let has_label = attrs.get("aria-label").is_some_and(|l| !l.is_empty());
        let alt = attrs
            .remove("alt")
            .map(|a| a.value)
            .filter(|a| !a.is_empty());
        if let Some(alt) = alt.filter(|_| !has_label) {
            attrs.insert("aria-label", alt);
        }
    }

    node.insert_before(video);
    node.detach();
    true
}
