//! Pure calculation functions for variant dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions of a variant whose *shorter* side is `target`.
///
/// Images are only ever downscaled: returns `None` when `target` exceeds the
/// source's shorter side. The longer side is scaled by the same ratio and
/// rounded to the nearest pixel (never below 1).
///
/// # Examples
/// ```
/// # use sitekiln::imaging::calculate_variant_dimensions;
/// // 1600x1200 landscape, short side → 600 gives 800x600
/// assert_eq!(calculate_variant_dimensions((1600, 1200), 600), Some((800, 600)));
///
/// // Source too small for the target: no variant
/// assert_eq!(calculate_variant_dimensions((300, 200), 480), None);
/// ```
pub fn calculate_variant_dimensions(original: (u32, u32), target: u32) -> Option<(u32, u32)> {
    let (orig_w, orig_h) = original;
    if target == 0 || orig_w == 0 || orig_h == 0 {
        return None;
    }

    let short = orig_w.min(orig_h);
    if target > short {
        return None;
    }

    let ratio = target as f64 / short as f64;
    if orig_w <= orig_h {
        // Portrait or square: width is the short side
        let h = ((orig_h as f64 * ratio).round() as u32).max(1);
        Some((target, h))
    } else {
        // Landscape: height is the short side
        let w = ((orig_w as f64 * ratio).round() as u32).max(1);
        Some((w, target))
    }
}

/// A single size variant planned for a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedVariant {
    /// Suffix token inserted before the extension (`name.<suffix>.ext`).
    pub suffix: String,
    /// Requested shorter-side size.
    pub target: u32,
    /// Calculated output width.
    pub width: u32,
    /// Calculated output height.
    pub height: u32,
}

/// Plan which variants to generate for an image of the given dimensions.
///
/// Variants whose target exceeds the source's shorter side are dropped.
/// Request order is preserved.
pub fn plan_variants(original: (u32, u32), requested: &[(String, u32)]) -> Vec<PlannedVariant> {
    requested
        .iter()
        .filter_map(|(suffix, target)| {
            calculate_variant_dimensions(original, *target).map(|(width, height)| PlannedVariant {
                suffix: suffix.clone(),
                target: *target,
                width,
                height,
            })
        })
        .collect()
}
