//! Contracts between the engine and its content plug-ins.
//!
//! The engine never knows what a "post" or an "article" is. It sees:
//!
//! - [`Content`]: a loaded item with a source path, a title, an HTML body,
//!   a draft flag and an optional canonical URL.
//! - [`ContentLoader`]: turns a source file into a [`Content`].
//! - [`ContentController`]: derives route patterns and exact URLs for an
//!   item, formats any extra HTML fields it owns, and renders the item to an
//!   output sink.
//!
//! Plug-ins are held as `Arc<dyn ...>` values in registration order. They
//! receive engine state only through call parameters.

use crate::format::{FormatError, FormatPass};
use crate::routes::RouteCaptures;
use std::any::Any;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("front matter error: {0}")]
    FrontMatter(String),
    #[error("invalid content: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render failed: {0}")]
    Failed(String),
}

/// A typed content item produced by a [`ContentLoader`].
///
/// Items are replaced wholesale on reload; the only in-place mutation is the
/// formatting pass, which swaps in a formatted copy.
pub trait Content: Send + Sync {
    /// Root-relative source path, forward slashes.
    fn source_path(&self) -> &str;

    fn title(&self) -> &str;

    /// Primary HTML body.
    fn html(&self) -> &str;

    fn set_html(&mut self, html: String);

    fn is_draft(&self) -> bool;

    /// Explicit canonical URL. When `None`, the first URL the owning
    /// controller produces is canonical.
    fn canonical_url(&self) -> Option<&str> {
        None
    }

    /// Clone into a fresh box; the formatting pass works on a copy.
    fn clone_box(&self) -> Box<dyn Content>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// What a loader is told about the file it is parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Root-relative path, forward slashes.
    pub path: String,
    /// Backing-type marker of the registration that matched.
    pub kind: String,
    /// Captures of the registration pattern against `path`. Index 0 is the
    /// whole match; groups that did not participate are empty strings.
    pub captures: Vec<String>,
}

pub trait ContentLoader: Send + Sync {
    /// Parse `reader` into a content item. Errors mark the file as malformed;
    /// the scan continues with other files.
    fn load(&self, source: &SourceFile, reader: &mut dyn Read)
    -> Result<Box<dyn Content>, LoadError>;
}

pub trait ContentController: Send + Sync {
    /// URL patterns (regexes, anchored by the route table) this item answers to.
    fn routes(&self, content: &dyn Content) -> Vec<String>;

    /// Exact URLs to produce when generating. Defaults to [`routes`](Self::routes),
    /// which is only correct when the routes contain no regex syntax.
    fn urls(&self, content: &dyn Content) -> Vec<String> {
        self.routes(content)
    }

    /// Format HTML fields other than the primary body. Runs on a working
    /// copy before the body goes through the formatter chain.
    fn apply_formatting(
        &self,
        _content: &mut dyn Content,
        _pass: &FormatPass<'_>,
    ) -> Result<(), FormatError> {
        Ok(())
    }

    /// Write the rendered item to `out`.
    fn render(
        &self,
        content: &dyn Content,
        captures: &RouteCaptures,
        out: &mut dyn Write,
    ) -> Result<(), RenderError>;
}
