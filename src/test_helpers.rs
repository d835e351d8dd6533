//! Shared test utilities for the sitekiln test suite.
//!
//! Provides fixture writers for content trees and images, plus stub
//! plug-ins (`StubLoader`, `RecordingController`) that let engine tests run
//! without the markdown pipeline.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_file(tmp.path(), "blog/post.md", "body");
//! write_test_jpeg(&tmp.path().join("photo.jpg"), 400, 300);
//! ```

use std::any::Any;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::content::{
    Content, ContentController, ContentLoader, LoadError, RenderError, SourceFile,
};
use crate::routes::RouteCaptures;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Write a small gradient JPEG with the given dimensions.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(path).unwrap();
}

/// Push a file's modification time `secs` seconds into the future.
pub fn bump_mtime(path: &Path, secs: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(secs);
    file.set_modified(later).unwrap();
}

// =========================================================================
// Stub plug-ins
// =========================================================================

/// Minimal content item: the file body is the HTML.
#[derive(Debug, Clone, Default)]
pub struct StubContent {
    pub path: String,
    pub title: String,
    pub html: String,
    pub draft: bool,
    pub canonical: Option<String>,
}

impl Content for StubContent {
    fn source_path(&self) -> &str {
        &self.path
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn html(&self) -> &str {
        &self.html
    }

    fn set_html(&mut self, html: String) {
        self.html = html;
    }

    fn is_draft(&self) -> bool {
        self.draft
    }

    fn canonical_url(&self) -> Option<&str> {
        self.canonical.as_deref()
    }

    fn clone_box(&self) -> Box<dyn Content> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Loads the whole file as HTML.
///
/// A first line of `DRAFT` marks the item as a draft; a first line of
/// `BROKEN` fails the load.
#[derive(Debug, Default)]
pub struct StubLoader;

impl ContentLoader for StubLoader {
    fn load(
        &self,
        source: &SourceFile,
        reader: &mut dyn Read,
    ) -> Result<Box<dyn Content>, LoadError> {
        let mut body = String::new();
        reader.read_to_string(&mut body)?;

        let (first, rest) = body.split_once('\n').unwrap_or((body.as_str(), ""));
        let (draft, html) = match first.trim() {
            "BROKEN" => return Err(LoadError::Invalid("marked broken".into())),
            "DRAFT" => (true, rest.to_string()),
            _ => (false, body.clone()),
        };

        Ok(Box::new(StubContent {
            path: source.path.clone(),
            title: source.path.clone(),
            html,
            draft,
            canonical: None,
        }))
    }
}

/// Controller with fixed route templates that records every render.
///
/// In a template, `{stem}` is replaced by the source path without its
/// extension.
#[derive(Debug, Default)]
pub struct RecordingController {
    routes: Vec<String>,
    renders: Mutex<Vec<(String, Vec<Option<String>>)>>,
}

impl RecordingController {
    pub fn new(routes: &[&str]) -> Self {
        Self {
            routes: routes.iter().map(|r| r.to_string()).collect(),
            renders: Mutex::new(Vec::new()),
        }
    }

    /// `(source path, captures after the whole match)` per render call.
    pub fn renders(&self) -> Vec<(String, Vec<Option<String>>)> {
        self.renders.lock().unwrap().clone()
    }
}

impl ContentController for RecordingController {
    fn routes(&self, content: &dyn Content) -> Vec<String> {
        let path = content.source_path();
        let stem = path.rsplit_once('.').map_or(path, |(stem, _)| stem);
        self.routes
            .iter()
            .map(|r| r.replace("{stem}", stem))
            .collect()
    }

    fn render(
        &self,
        content: &dyn Content,
        captures: &RouteCaptures,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        self.renders.lock().unwrap().push((
            content.source_path().to_string(),
            captures.groups().map(|g| g.map(String::from)).collect(),
        ));
        out.write_all(content.html().as_bytes())?;
        Ok(())
    }
}
