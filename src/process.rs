//! Static asset processors.
//!
//! A static asset is copied (and for images, downscaled) from the content
//! root into the build root. It is never parsed into a content item.
//!
//! Each processor answers three questions about a root-relative path:
//!
//! | Operation | Meaning |
//! |---|---|
//! | [`matches`](StaticProcessor::matches) | directory prefix + extension allow-list + exclusion regexes |
//! | [`is_stale`](StaticProcessor::is_stale) | does any expected output need (re)writing? |
//! | [`output`](StaticProcessor::output) | write the outputs |
//!
//! ## Output Layout
//!
//! ```text
//! content/photos/dawn.jpg   [[processors]] dir = "photos", output_dir = "img"
//!   → dist/img/dawn.jpg          base copy (unless skip_original)
//!   → dist/img/dawn.small.jpg    variant, shorter side = size
//! ```
//!
//! ## Staleness
//!
//! An asset is stale when an expected output is missing or older than the
//! source. A variant is only expected when the source's shorter side is
//! larger than the variant size, so a small image never looks stale because
//! of the variants it will never get. Image dimensions are read only when a
//! variant file is actually missing.

use crate::config::{ProcessorConfig, ProcessorKind, SiteConfig};
use crate::imaging::operations::plan;
use crate::imaging::{
    BackendError, ImageBackend, Quality, VariantConfig, create_variants, get_dimensions,
    variant_path,
};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Invalid exclude pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),
}

pub trait StaticProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this processor claims the root-relative `path`.
    fn matches(&self, path: &str) -> bool;

    /// Whether [`output`](Self::output) has work to do for `path`.
    fn is_stale(&self, path: &str) -> bool;

    /// Write every expected output for `path`. Returns the files written.
    fn output(&self, path: &str) -> Result<Vec<PathBuf>, ProcessError>;
}

/// Match predicate shared by every processor kind.
#[derive(Debug, Clone)]
pub struct MatchRules {
    dir: String,
    extensions: Vec<String>,
    exclude: Vec<Regex>,
}

impl MatchRules {
    pub fn new(dir: &str, extensions: &[String], exclude: &[String]) -> Result<Self, ProcessError> {
        Ok(Self {
            dir: dir.trim_matches('/').to_string(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            exclude: exclude
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        if strip_dir(&self.dir, path).is_none() {
            return false;
        }
        if !self.extensions.is_empty() {
            let ext = extension(path).map(str::to_lowercase);
            if !ext.is_some_and(|ext| self.extensions.contains(&ext)) {
                return false;
            }
        }
        !self.exclude.iter().any(|re| re.is_match(path))
    }
}

/// Path of `path` below `dir`, or `None` when it is outside.
fn strip_dir<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(path);
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

fn extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    (!stem.is_empty()).then_some(ext)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Where a processor reads from and writes to.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    source_root: PathBuf,
    build_root: PathBuf,
    dir: String,
    output_dir: String,
}

impl OutputLayout {
    pub fn new(source_root: &Path, build_root: &Path, dir: &str, output_dir: &str) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            build_root: build_root.to_path_buf(),
            dir: dir.trim_matches('/').to_string(),
            output_dir: output_dir.trim_matches('/').to_string(),
        }
    }

    pub fn source_path(&self, path: &str) -> PathBuf {
        self.source_root.join(path)
    }

    /// Base output for `path`: the input dir prefix is swapped for the output dir.
    pub fn output_path(&self, path: &str) -> PathBuf {
        let rel = strip_dir(&self.dir, path).unwrap_or(path);
        let mut out = self.build_root.clone();
        if !self.output_dir.is_empty() {
            out.push(&self.output_dir);
        }
        out.join(rel)
    }
}

fn ensure_parent(path: &Path) -> Result<(), ProcessError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ============================================================================
// Copy
// ============================================================================

/// Copies files verbatim.
#[derive(Debug)]
pub struct CopyProcessor {
    name: String,
    rules: MatchRules,
    layout: OutputLayout,
}

impl CopyProcessor {
    pub fn new(name: &str, rules: MatchRules, layout: OutputLayout) -> Self {
        Self {
            name: name.to_string(),
            rules,
            layout,
        }
    }
}

impl StaticProcessor for CopyProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, path: &str) -> bool {
        self.rules.matches(path)
    }

    fn is_stale(&self, path: &str) -> bool {
        let Some(source_time) = modified(&self.layout.source_path(path)) else {
            return true;
        };
        match modified(&self.layout.output_path(path)) {
            Some(output_time) => output_time < source_time,
            None => true,
        }
    }

    fn output(&self, path: &str) -> Result<Vec<PathBuf>, ProcessError> {
        let source = self.layout.source_path(path);
        if !source.is_file() {
            return Err(ProcessError::SourceNotFound(source));
        }
        let output = self.layout.output_path(path);
        ensure_parent(&output)?;
        fs::copy(&source, &output)?;
        Ok(vec![output])
    }
}

// ============================================================================
// Image
// ============================================================================

/// Copies images and writes downscaled variants next to the copy.
pub struct ImageProcessor {
    name: String,
    rules: MatchRules,
    layout: OutputLayout,
    backend: Arc<dyn ImageBackend>,
    variants: VariantConfig,
    skip_original: bool,
}

impl ImageProcessor {
    pub fn new(
        name: &str,
        rules: MatchRules,
        layout: OutputLayout,
        backend: Arc<dyn ImageBackend>,
        variants: VariantConfig,
        skip_original: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            rules,
            layout,
            backend,
            variants,
            skip_original,
        }
    }
}

impl StaticProcessor for ImageProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, path: &str) -> bool {
        self.rules.matches(path)
    }

    fn is_stale(&self, path: &str) -> bool {
        let source = self.layout.source_path(path);
        let Some(source_time) = modified(&source) else {
            return true;
        };
        let base = self.layout.output_path(path);

        if !self.skip_original {
            match modified(&base) {
                Some(t) if t >= source_time => {}
                _ => return true,
            }
        }

        let mut missing = Vec::new();
        for (suffix, _) in &self.variants.sizes {
            match modified(&variant_path(&base, suffix)) {
                Some(t) if t < source_time => return true,
                Some(_) => {}
                None => missing.push(suffix.as_str()),
            }
        }
        if missing.is_empty() {
            return false;
        }

        // Missing variants only count when the source is big enough for them.
        match get_dimensions(self.backend.as_ref(), &source) {
            Ok(dims) => plan(dims, &self.variants)
                .iter()
                .any(|v| missing.contains(&v.suffix.as_str())),
            Err(e) => {
                log::debug!("{}: cannot read dimensions ({}), treating as stale", path, e);
                true
            }
        }
    }

    fn output(&self, path: &str) -> Result<Vec<PathBuf>, ProcessError> {
        let source = self.layout.source_path(path);
        if !source.is_file() {
            return Err(ProcessError::SourceNotFound(source));
        }
        let base = self.layout.output_path(path);
        ensure_parent(&base)?;

        let mut written = Vec::new();
        if !self.skip_original {
            fs::copy(&source, &base)?;
            written.push(base.clone());
        }

        if !self.variants.sizes.is_empty() {
            let dims = get_dimensions(self.backend.as_ref(), &source)?;
            let generated =
                create_variants(self.backend.as_ref(), &source, &base, dims, &self.variants)?;
            written.extend(generated.into_iter().map(|v| v.path));
        }
        Ok(written)
    }
}

/// Build one processor per `[[processors]]` entry, in config order.
pub fn processors_from_config(
    config: &SiteConfig,
    source_root: &Path,
    build_root: &Path,
    backend: Arc<dyn ImageBackend>,
) -> Result<Vec<Arc<dyn StaticProcessor>>, ProcessError> {
    config
        .processors
        .iter()
        .map(|p| processor_from_config(p, source_root, build_root, backend.clone()))
        .collect()
}

fn processor_from_config(
    config: &ProcessorConfig,
    source_root: &Path,
    build_root: &Path,
    backend: Arc<dyn ImageBackend>,
) -> Result<Arc<dyn StaticProcessor>, ProcessError> {
    let rules = MatchRules::new(&config.dir, &config.extensions, &config.exclude)?;
    let layout = OutputLayout::new(
        source_root,
        build_root,
        &config.dir,
        config.effective_output_dir(),
    );
    Ok(match config.kind {
        ProcessorKind::Copy => Arc::new(CopyProcessor::new(&config.name, rules, layout)),
        ProcessorKind::Image => Arc::new(ImageProcessor::new(
            &config.name,
            rules,
            layout,
            backend,
            VariantConfig {
                sizes: config
                    .variants
                    .iter()
                    .map(|v| (v.suffix.clone(), v.size))
                    .collect(),
                quality: Quality::new(config.quality),
            },
            config.skip_original,
        )),
    })
}
