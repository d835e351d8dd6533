//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the image processor
//! needs: identify (read dimensions without a full decode) and resize
//! (downscale and encode a variant).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate and statically linked into the binary.

use super::params::ResizeParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Send + Sync` so a single backend can be shared by every processor and
/// driven from rayon workers and watch-handler threads alike.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Execute a resize operation. Embedded metadata is not carried over.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;
}
