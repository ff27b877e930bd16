//! Pure calculation functions for variant and placeholder dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// A single responsive variant to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSize {
    pub width: u32,
    pub height: u32,
}

/// Calculate which variant widths to generate for a source.
///
/// Requested widths larger than the source are dropped (no upscaling); the
/// rest are returned ascending and de-duplicated. If every requested width
/// exceeds the source, the source width is the only entry.
///
/// # Examples
/// ```
/// # use imgdim::imaging::calculate_variant_widths;
/// assert_eq!(calculate_variant_widths(1000, &[1280, 320, 640]), vec![320, 640]);
/// assert_eq!(calculate_variant_widths(200, &[320, 640]), vec![200]);
/// ```
pub fn calculate_variant_widths(source_width: u32, widths: &[u32]) -> Vec<u32> {
    let mut result: Vec<u32> = widths
        .iter()
        .copied()
        .filter(|&w| w > 0 && w <= source_width)
        .collect();
    result.sort_unstable();
    result.dedup();

    if result.is_empty() {
        result.push(source_width);
    }
    result
}

/// Output dimensions for each variant width, preserving the aspect ratio.
///
/// Heights are rounded and never drop below one pixel.
pub fn calculate_variant_sizes(source: (u32, u32), widths: &[u32]) -> Vec<VariantSize> {
    let (src_w, src_h) = source;
    calculate_variant_widths(src_w, widths)
        .into_iter()
        .map(|width| {
            let height = (src_h as f64 * width as f64 / src_w as f64).round() as u32;
            VariantSize {
                width,
                height: height.max(1),
            }
        })
        .collect()
}

/// Scale a source down so its longer edge equals `max_edge`.
///
/// Sources already within `max_edge` keep their size. Both edges stay at
/// least one pixel.
pub fn calculate_placeholder_dimensions(source: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let longer = src_w.max(src_h);
    if longer <= max_edge {
        return (src_w.max(1), src_h.max(1));
    }

    let ratio = max_edge as f64 / longer as f64;
    let w = (src_w as f64 * ratio).round() as u32;
    let h = (src_h as f64 * ratio).round() as u32;
    (w.max(1), h.max(1))
}
