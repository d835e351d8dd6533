//! Engine configuration module.
//!
//! Handles loading, validating, and merging `sitekiln.toml`. Stock defaults
//! are overridden by the user's file; CLI flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! content_root = "content"
//! build_root = "dist"
//! include_drafts = false
//! default_document = "index.html"
//! formatters = ["cross-links", "external-links"]
//!
//! [watch]
//! debounce_ms = 100
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [[processors]]
//! name = "images"
//! kind = "image"            # "copy" or "image"
//! dir = ""                  # Root-relative input directory ("" = whole tree)
//! extensions = ["jpg", "jpeg", "png", "webp"]
//! exclude = []              # Regexes tested against the root-relative path
//! quality = 90              # JPEG quality for variants
//! skip_original = false
//!
//! [[processors.variants]]
//! suffix = "small"          # photo.jpg → photo.small.jpg
//! size = 480                # Shorter side in pixels
//!
//! [[content]]
//! pattern = "^(.+)\\.(md|markdown)$"
//! kind = "markdown"         # "markdown" or "html"
//! routes = ["/\\1/"]
//! ```
//!
//! Arrays (`processors`, `content`, `formatters`) replace the stock list as a
//! whole; tables merge key by key. Unknown keys are rejected to catch typos
//! early.

use crate::imaging::rust_backend::supported_output_extensions;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "sitekiln.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `sitekiln.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory scanned for content and static assets.
    pub content_root: String,
    /// Directory generated pages and static outputs are written to.
    pub build_root: String,
    /// Keep items whose front matter sets `draft = true`.
    pub include_drafts: bool,
    /// File name appended to URLs ending in `/` when generating.
    pub default_document: String,
    /// Built-in HTML formatters, applied in order.
    pub formatters: Vec<FormatterKind>,
    pub watch: WatchConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
    /// Static asset processors, tried in order before content registrations.
    pub processors: Vec<ProcessorConfig>,
    /// Content registrations, tried in order.
    pub content: Vec<ContentConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            content_root: "content".to_string(),
            build_root: "dist".to_string(),
            include_drafts: false,
            default_document: "index.html".to_string(),
            formatters: vec![FormatterKind::CrossLinks, FormatterKind::ExternalLinks],
            watch: WatchConfig::default(),
            server: ServerConfig::default(),
            processing: ProcessingConfig::default(),
            processors: vec![
                ProcessorConfig {
                    name: "images".to_string(),
                    kind: ProcessorKind::Image,
                    extensions: ["jpg", "jpeg", "png", "webp"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    ..ProcessorConfig::default()
                },
                ProcessorConfig {
                    name: "files".to_string(),
                    kind: ProcessorKind::Copy,
                    exclude: vec![r"\.(md|markdown|html)$".to_string()],
                    ..ProcessorConfig::default()
                },
            ],
            content: vec![
                ContentConfig {
                    pattern: r"^index\.(md|markdown)$".to_string(),
                    kind: ContentKind::Markdown,
                    routes: vec!["/".to_string()],
                },
                ContentConfig {
                    pattern: r"^(.+)\.(md|markdown)$".to_string(),
                    kind: ContentKind::Markdown,
                    routes: vec![r"/\1/".to_string()],
                },
                ContentConfig {
                    pattern: r"^(.+)\.html$".to_string(),
                    kind: ContentKind::Html,
                    routes: vec![r"/\1\.html".to_string()],
                },
            ],
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_document.is_empty() || self.default_document.contains('/') {
            return Err(ConfigError::Validation(
                "default_document must be a plain file name".into(),
            ));
        }

        let mut names = HashSet::new();
        for processor in &self.processors {
            if !names.insert(processor.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate processor name '{}'",
                    processor.name
                )));
            }
            processor.validate()?;
        }

        for (i, content) in self.content.iter().enumerate() {
            Regex::new(&content.pattern).map_err(|e| {
                ConfigError::Validation(format!("content[{}].pattern is not a valid regex: {}", i, e))
            })?;
            if content.routes.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "content[{}].routes must not be empty",
                    i
                )));
            }
        }
        Ok(())
    }
}

/// Filesystem watch settings (serve mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Delay before acting on an event, so half-written files are not read.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// HTTP front door settings (serve mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    /// Copy the file verbatim.
    Copy,
    /// Copy the original and write downscaled size variants.
    Image,
}

/// One static asset processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    pub name: String,
    pub kind: ProcessorKind,
    /// Root-relative input directory. Empty matches the whole tree.
    pub dir: String,
    /// Case-insensitive extension allow-list. Empty allows any extension.
    pub extensions: Vec<String>,
    /// Regexes tested against the root-relative path; any hit excludes the file.
    pub exclude: Vec<String>,
    /// Output directory under the build root. Defaults to `dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Encoding quality for JPEG variants (1-100).
    pub quality: u32,
    /// Write only the variants, not a copy of the original.
    pub skip_original: bool,
    pub variants: Vec<VariantConfig>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ProcessorKind::Copy,
            dir: String::new(),
            extensions: Vec::new(),
            exclude: Vec::new(),
            output_dir: None,
            quality: 90,
            skip_original: false,
            variants: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| -> Result<(), ConfigError> {
            Err(ConfigError::Validation(format!("processor '{}': {}", self.name, msg)))
        };

        if self.name.is_empty() {
            return Err(ConfigError::Validation("processor name must not be empty".into()));
        }
        if self.quality == 0 || self.quality > 100 {
            return fail("quality must be 1-100".into());
        }
        for pattern in &self.exclude {
            if let Err(e) = Regex::new(pattern) {
                return fail(format!("exclude pattern is not a valid regex: {}", e));
            }
        }
        if self.kind == ProcessorKind::Copy && !self.variants.is_empty() {
            return fail("variants are only supported by image processors".into());
        }
        if self.kind == ProcessorKind::Copy && self.skip_original {
            return fail("skip_original is only supported by image processors".into());
        }

        if self.kind == ProcessorKind::Image && !self.variants.is_empty() {
            if self.extensions.is_empty() {
                return fail("image processors with variants need an extension list".into());
            }
            let supported = supported_output_extensions();
            for ext in &self.extensions {
                if !supported.contains(&ext.to_ascii_lowercase().as_str()) {
                    return fail(format!("cannot write variants as '.{}'", ext));
                }
            }
        }

        let mut suffixes = HashSet::new();
        for variant in &self.variants {
            if variant.size == 0 {
                return fail(format!("variant '{}' size must be non-zero", variant.suffix));
            }
            if variant.suffix.is_empty() || variant.suffix.contains(['/', '.']) {
                return fail(format!("variant suffix '{}' is not a plain token", variant.suffix));
            }
            if !suffixes.insert(variant.suffix.as_str()) {
                return fail(format!("duplicate variant suffix '{}'", variant.suffix));
            }
        }
        Ok(())
    }

    /// Output directory under the build root.
    pub fn effective_output_dir(&self) -> &str {
        self.output_dir.as_deref().unwrap_or(&self.dir)
    }
}

/// A named size variant of an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    /// Token inserted before the extension.
    pub suffix: String,
    /// Target size of the shorter side in pixels.
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Front matter + Markdown body.
    Markdown,
    /// Front matter + HTML body, kept verbatim.
    Html,
}

/// One content registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    /// Regex matched against the root-relative path.
    pub pattern: String,
    pub kind: ContentKind,
    /// Route templates; `\N` refers to capture N of `pattern`.
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatterKind {
    /// Resolve `@/path` links to canonical URLs.
    CrossLinks,
    /// Add `rel="noopener noreferrer"` to external links.
    ExternalLinks,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults do not serialize: {}", e)))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay (arrays included) replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `sitekiln.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitekiln configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Tables merge with the defaults key by key; arrays (processors, content,
# formatters) replace the default list entirely.
# Unknown keys will cause an error.

# Directory scanned for content and static assets.
content_root = "content"

# Directory generated pages and static outputs are written to.
build_root = "dist"

# Keep items whose front matter sets `draft = true`.
include_drafts = false

# File name appended to URLs that end in "/" when generating.
default_document = "index.html"

# HTML formatters applied to every content item after loading, in order.
#   cross-links    : href="@/blog/post.md" → the target's canonical URL
#                    (an unknown target fails the item)
#   external-links : adds rel="noopener noreferrer" to http(s) links
formatters = ["cross-links", "external-links"]

# ---------------------------------------------------------------------------
# Serve mode
# ---------------------------------------------------------------------------
[watch]
# Delay before reacting to a filesystem event, in milliseconds.
debounce_ms = 100

[server]
host = "127.0.0.1"
port = 3000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Static asset processors
# ---------------------------------------------------------------------------
# Tried in order; the first processor whose dir, extensions and exclude
# rules accept a file claims it. Files no processor claims are offered to
# the content registrations below.

[[processors]]
name = "images"
kind = "image"
dir = ""
extensions = ["jpg", "jpeg", "png", "webp"]
exclude = []
# output_dir = "images"   # defaults to dir
quality = 90
skip_original = false
# Downscaled variants, named photo.<suffix>.jpg. `size` is the shorter side.
# Images are never upscaled: a variant larger than the source is skipped.
# [[processors.variants]]
# suffix = "small"
# size = 480

[[processors]]
name = "files"
kind = "copy"
dir = ""
extensions = []
exclude = ['\.(md|markdown|html)$']

# ---------------------------------------------------------------------------
# Content registrations
# ---------------------------------------------------------------------------
# Tried in order; the first pattern matching the root-relative path wins.
# Route templates are regexes; \1, \2 ... refer to captures of `pattern`.

[[content]]
pattern = '^index\.(md|markdown)$'
kind = "markdown"
routes = ['/']

[[content]]
pattern = '^(.+)\.(md|markdown)$'
kind = "markdown"
routes = ['/\1/']

[[content]]
pattern = '^(.+)\.html$'
kind = "html"
routes = ['/\1\.html']
"##
}
