//! Static site generation.
//!
//! Walks every content item, asks its controller for the exact URLs it
//! wants produced, and renders each one through [`Engine::render`] (the same
//! path `serve` uses) into a buffer that is then written to disk.
//!
//! ## URL → File
//!
//! ```text
//! /                 → dist/index.html
//! /blog/post/       → dist/blog/post/index.html
//! /feed.xml         → dist/feed.xml
//! ```
//!
//! The default document name comes from `default_document`. Items are
//! generated in parallel; a failed URL is logged and counted, and the rest
//! carry on. Generation succeeds only when nothing failed.

use crate::content::RenderError;
use crate::engine::{Engine, Failure, RenderOutcome};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
    #[error("no route answers {0}")]
    NotHandled(String),
    #[error("engine is still loading")]
    Loading,
    #[error("URL '{0}' escapes the build root")]
    InvalidUrl(String),
}

/// One written page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateReport {
    /// Content items visited.
    pub items: usize,
    pub written: Vec<GeneratedFile>,
    /// Failures keyed by content path; the message names the URL.
    pub errors: Vec<Failure>,
}

impl GenerateReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Output file for `url` under `build_root`.
///
/// A URL that is empty or ends in `/` gets `default_document` appended.
/// `..` segments are refused.
pub fn url_to_output_path(
    build_root: &Path,
    url: &str,
    default_document: &str,
) -> Result<PathBuf, GenerateError> {
    let mut path = build_root.to_path_buf();
    let trimmed = url.trim_start_matches('/');
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." || segment == "." {
            return Err(GenerateError::InvalidUrl(url.to_string()));
        }
        path.push(segment);
    }
    if trimmed.is_empty() || trimmed.ends_with('/') {
        path.push(default_document);
    }
    Ok(path)
}

/// Render one URL and write it to its output file.
pub fn generate_url(engine: &Engine, url: &str) -> Result<PathBuf, GenerateError> {
    let settings = engine.settings();
    let output = url_to_output_path(&settings.build_root, url, &settings.default_document)?;

    let mut buffer = Vec::new();
    match engine.render(url, &mut buffer)? {
        RenderOutcome::Rendered { .. } => {}
        RenderOutcome::NotHandled => return Err(GenerateError::NotHandled(url.to_string())),
        RenderOutcome::Loading => return Err(GenerateError::Loading),
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, buffer)?;
    Ok(output)
}

/// Write every URL of every content item.
pub fn generate(engine: &Engine) -> GenerateReport {
    let entries = engine.store().content_entries();

    let per_item: Vec<Vec<(String, String, Result<PathBuf, GenerateError>)>> = entries
        .par_iter()
        .map(|(path, entry)| {
            let urls = entry.read(|content| entry.controller().urls(content));
            urls.into_iter()
                .map(|url| {
                    let result = generate_url(engine, &url);
                    (path.clone(), url, result)
                })
                .collect()
        })
        .collect();

    let mut report = GenerateReport {
        items: entries.len(),
        ..GenerateReport::default()
    };
    for (path, url, result) in per_item.into_iter().flatten() {
        match result {
            Ok(output) => report.written.push(GeneratedFile { url, path: output }),
            Err(e) => {
                log::warn!("{} ({}): {}", path, url, e);
                report.errors.push(Failure::new(&path, format!("{}: {}", url, e)));
            }
        }
    }

    log::info!(
        "generated {} files from {} items, {} errors",
        report.written.len(),
        report.items,
        report.errors.len()
    );
    report
}
