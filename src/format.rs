//! HTML formatter chain.
//!
//! Every loaded item's HTML goes through the chain once the *whole* scan has
//! populated the content store, so formatters can resolve references to other
//! items. Each formatter receives the previous one's output.
//!
//! ## Built-in formatters
//!
//! | Name | Effect |
//! |---|---|
//! | `cross-links` | `href="@/blog/post.md#intro"` → `href="/blog/post/#intro"`; unknown targets fail the item |
//! | `external-links` | adds `rel="noopener noreferrer"` to `http(s)` anchors without a `rel` |
//!
//! A formatter that cannot resolve a reference returns an error instead of
//! emitting a dangling link. The engine then keeps the item's unformatted
//! HTML and counts the failure.

use crate::config::FormatterKind;
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("{source_path}: link target '{target}' is not a loaded content item")]
    UnresolvedLink { source_path: String, target: String },
    #[error("{source_path}: formatter '{formatter}' failed: {message}")]
    Failed {
        source_path: String,
        formatter: String,
        message: String,
    },
}

/// Read access to other content items during formatting.
pub trait ContentResolver: Sync {
    /// Canonical URL of the item loaded from `source_path`, if it is loaded.
    fn canonical_url(&self, source_path: &str) -> Option<String>;
}

pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    fn format(
        &self,
        html: &str,
        source_path: &str,
        resolver: &dyn ContentResolver,
    ) -> Result<String, FormatError>;
}

/// Ordered list of formatters.
#[derive(Clone, Default)]
pub struct FormatterChain {
    formatters: Vec<Arc<dyn Formatter>>,
}

impl FormatterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain of built-in formatters, in the given order.
    pub fn from_kinds(kinds: &[FormatterKind]) -> Self {
        let mut chain = Self::new();
        for kind in kinds {
            match kind {
                FormatterKind::CrossLinks => chain.push(Arc::new(CrossLinkFormatter)),
                FormatterKind::ExternalLinks => chain.push(Arc::new(ExternalLinkFormatter)),
            }
        }
        chain
    }

    pub fn push(&mut self, formatter: Arc<dyn Formatter>) {
        self.formatters.push(formatter);
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.formatters.iter().map(|f| f.name()).collect()
    }

    /// Run every formatter in order. Stops at the first error.
    pub fn apply(
        &self,
        html: &str,
        source_path: &str,
        resolver: &dyn ContentResolver,
    ) -> Result<String, FormatError> {
        let mut current = html.to_string();
        for formatter in &self.formatters {
            current = formatter.format(&current, source_path, resolver)?;
        }
        Ok(current)
    }
}

/// A chain bound to a resolver, handed to controllers that format extra fields.
pub struct FormatPass<'a> {
    chain: &'a FormatterChain,
    resolver: &'a dyn ContentResolver,
}

impl<'a> FormatPass<'a> {
    pub fn new(chain: &'a FormatterChain, resolver: &'a dyn ContentResolver) -> Self {
        Self { chain, resolver }
    }

    pub fn format(&self, html: &str, source_path: &str) -> Result<String, FormatError> {
        self.chain.apply(html, source_path, self.resolver)
    }

    pub fn resolver(&self) -> &dyn ContentResolver {
        self.resolver
    }
}

// =============================================================================
// Built-in formatters
// =============================================================================

static CROSS_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(href|src)="@/([^"#]+)(#[^"]*)?""##).expect("cross-link regex is valid")
});

static ANCHOR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a\s[^>]*>").expect("anchor regex is valid"));

static EXTERNAL_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\shref=["']https?://"#).expect("external href regex is valid")
});

static HAS_REL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\srel\s*=").expect("rel regex is valid"));

/// Rewrites `@/<source path>` references to the target's canonical URL.
pub struct CrossLinkFormatter;

impl Formatter for CrossLinkFormatter {
    fn name(&self) -> &str {
        "cross-links"
    }

    fn format(
        &self,
        html: &str,
        source_path: &str,
        resolver: &dyn ContentResolver,
    ) -> Result<String, FormatError> {
        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        for caps in CROSS_LINK.captures_iter(html) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let attr = &caps[1];
            let target = &caps[2];
            let fragment = caps.get(3).map_or("", |m| m.as_str());

            let url = resolver
                .canonical_url(target)
                .ok_or_else(|| FormatError::UnresolvedLink {
                    source_path: source_path.to_string(),
                    target: target.to_string(),
                })?;

            out.push_str(&html[last..whole.start]);
            out.push_str(&format!("{}=\"{}{}\"", attr, url, fragment));
            last = whole.end;
        }
        out.push_str(&html[last..]);
        Ok(out)
    }
}

/// Marks absolute `http(s)` links as `rel="noopener noreferrer"`.
pub struct ExternalLinkFormatter;

impl Formatter for ExternalLinkFormatter {
    fn name(&self) -> &str {
        "external-links"
    }

    fn format(
        &self,
        html: &str,
        _source_path: &str,
        _resolver: &dyn ContentResolver,
    ) -> Result<String, FormatError> {
        let formatted = ANCHOR_TAG.replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            if EXTERNAL_HREF.is_match(tag) && !HAS_REL.is_match(tag) {
                format!("{} rel=\"noopener noreferrer\">", &tag[..tag.len() - 1])
            } else {
                tag.to_string()
            }
        });
        Ok(formatted.into_owned())
    }
}
