//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{PlannedVariant, plan_variants};
use super::params::{Quality, ResizeParams};
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &dyn ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// Insert a suffix token before the final extension.
///
/// `photos/dawn.jpg` + `small` → `photos/dawn.small.jpg`. A file without an
/// extension gets the suffix appended: `photos/dawn` → `photos/dawn.small`.
pub fn variant_path(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}.{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}.{}", stem, suffix),
    };
    base.with_file_name(name)
}

/// A variant that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVariant {
    pub suffix: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Configuration for variant generation.
#[derive(Debug, Clone)]
pub struct VariantConfig {
    /// `(suffix, shorter-side size)` pairs, in generation order.
    pub sizes: Vec<(String, u32)>,
    pub quality: Quality,
}

/// Plan variants for a source without executing anything.
pub fn plan(original_dims: (u32, u32), config: &VariantConfig) -> Vec<PlannedVariant> {
    plan_variants(original_dims, &config.sizes)
}

/// Create downscaled variants next to `base_output`.
///
/// Sizes larger than the source's shorter side are skipped.
pub fn create_variants(
    backend: &dyn ImageBackend,
    source: &Path,
    base_output: &Path,
    original_dims: (u32, u32),
    config: &VariantConfig,
) -> Result<Vec<GeneratedVariant>> {
    let mut generated = Vec::new();

    for PlannedVariant {
        suffix,
        width,
        height,
        ..
    } in plan(original_dims, config)
    {
        let output = variant_path(base_output, &suffix);
        backend.resize(&ResizeParams {
            source: source.to_path_buf(),
            output: output.clone(),
            width,
            height,
            quality: config.quality,
        })?;

        generated.push(GeneratedVariant {
            suffix,
            path: output,
            width,
            height,
        });
    }

    Ok(generated)
}
