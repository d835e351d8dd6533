//! Built-in page loader and controller.
//!
//! A page is a text file with an optional TOML front matter block fenced by
//! `+++` lines, followed by a Markdown or HTML body:
//!
//! ```text
//! +++
//! title = "Hello"
//! description = "First post"
//! draft = false
//! url = "/hello/"           # canonical URL; replaces the route templates
//! +++
//! # Hello
//!
//! Body text.
//! ```
//!
//! ## Title Resolution
//!
//! First available wins:
//! 1. `title` in front matter
//! 2. First `# heading` line of a Markdown body
//! 3. File stem, numeric prefix stripped, dashes as spaces (`010-who-am-i.md` → "who am i")
//!
//! ## Route Templates
//!
//! [`PageController`] holds templates such as `/pages/\1/` where `\N` is the
//! N-th capture of the registration pattern against the source path. As a
//! route, `\N` becomes a group matching exactly the captured text, so the
//! renderer sees it as capture N. As an exact URL, `\N` becomes the captured
//! text itself and other regex escapes (`\.`) are dropped.

use crate::content::{
    Content, ContentController, ContentLoader, LoadError, RenderError, SourceFile,
};
use crate::routes::RouteCaptures;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Options, Parser, html as md_html};
use serde::Deserialize;
use std::any::Any;
use std::io::{Read, Write};

/// Fields recognised in a `+++` block. Anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub draft: bool,
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

/// Split a document into its front matter and body.
///
/// A document without a leading `+++` line has default front matter and is
/// returned whole. An opening fence without a closing one is an error.
pub fn split_front_matter(text: &str) -> Result<(FrontMatter, &str), LoadError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some(rest) = text
        .strip_prefix("+++\r\n")
        .or_else(|| text.strip_prefix("+++\n"))
    else {
        return Ok((FrontMatter::default(), text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "+++" {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let front: FrontMatter =
                toml::from_str(header).map_err(|e| LoadError::FrontMatter(e.to_string()))?;
            return Ok((front, body));
        }
        offset += line.len();
    }
    Err(LoadError::FrontMatter("missing closing +++ line".into()))
}

/// Convert Markdown to HTML with tables, footnotes and strikethrough.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

/// Text of the first `# ` line, if any.
fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Display title from a path: `notes/010-who-am-i.md` → "who am i".
pub fn stem_title(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    let name = match stem.split_once('-') {
        Some((prefix, rest))
            if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => stem,
    };
    name.replace('-', " ")
}

/// A loaded page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub path: String,
    pub title: String,
    pub description: Option<String>,
    /// Canonical URL from front matter.
    pub url: Option<String>,
    pub draft: bool,
    pub html: String,
    /// Registration pattern captures; index 0 is the whole match.
    pub captures: Vec<String>,
    pub extra: toml::Table,
}

impl Content for Page {
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
        self.url.as_deref()
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

/// Front matter + Markdown or HTML body.
#[derive(Debug, Clone, Copy)]
pub struct PageLoader {
    markdown: bool,
}

impl PageLoader {
    pub fn markdown() -> Self {
        Self { markdown: true }
    }

    /// Body is kept verbatim.
    pub fn html() -> Self {
        Self { markdown: false }
    }
}

impl ContentLoader for PageLoader {
    fn load(
        &self,
        source: &SourceFile,
        reader: &mut dyn Read,
    ) -> Result<Box<dyn Content>, LoadError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let (front, body) = split_front_matter(&text)?;

        let heading = if self.markdown { first_heading(body) } else { None };
        let title = front
            .title
            .clone()
            .or(heading)
            .unwrap_or_else(|| stem_title(&source.path));

        let html = if self.markdown {
            markdown_to_html(body)
        } else {
            body.to_string()
        };

        if let Some(url) = &front.url {
            if !url.starts_with('/') {
                return Err(LoadError::Invalid(format!(
                    "url '{}' must be root-relative",
                    url
                )));
            }
        }

        Ok(Box::new(Page {
            path: source.path.clone(),
            title,
            description: front.description,
            url: front.url,
            draft: front.draft,
            html,
            captures: source.captures.clone(),
            extra: front.extra,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expansion {
    Route,
    Url,
}

/// Expand `\N` in a route template to a group matching capture N literally.
pub fn expand_route(template: &str, captures: &[String]) -> String {
    expand(template, captures, Expansion::Route)
}

/// Expand `\N` to capture N and drop other escapes, yielding a plain URL.
pub fn expand_url(template: &str, captures: &[String]) -> String {
    expand(template, captures, Expansion::Url)
}

fn expand(template: &str, captures: &[String], mode: Expansion) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let next = chars.next();
        if let Some(index) = next.and_then(|d| d.to_digit(10)) {
            let value = captures.get(index as usize).map_or("", String::as_str);
            match mode {
                Expansion::Route => {
                    out.push('(');
                    out.push_str(&regex::escape(value));
                    out.push(')');
                }
                Expansion::Url => out.push_str(value),
            }
            continue;
        }
        if mode == Expansion::Route {
            out.push('\\');
        }
        if let Some(other) = next {
            out.push(other);
        }
    }
    out
}

/// Routes pages by template and renders them as standalone HTML documents.
#[derive(Debug, Clone)]
pub struct PageController {
    templates: Vec<String>,
}

impl PageController {
    pub fn new(templates: Vec<String>) -> Self {
        Self { templates }
    }

    fn captures(content: &dyn Content) -> &[String] {
        content
            .as_any()
            .downcast_ref::<Page>()
            .map(|page| page.captures.as_slice())
            .unwrap_or_default()
    }
}

impl ContentController for PageController {
    fn routes(&self, content: &dyn Content) -> Vec<String> {
        if let Some(url) = content.canonical_url() {
            return vec![regex::escape(url)];
        }
        let captures = Self::captures(content);
        self.templates
            .iter()
            .map(|t| expand_route(t, captures))
            .collect()
    }

    fn urls(&self, content: &dyn Content) -> Vec<String> {
        if let Some(url) = content.canonical_url() {
            return vec![url.to_string()];
        }
        let captures = Self::captures(content);
        self.templates
            .iter()
            .map(|t| expand_url(t, captures))
            .collect()
    }

    fn render(
        &self,
        content: &dyn Content,
        _captures: &RouteCaptures,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let page = content
            .as_any()
            .downcast_ref::<Page>()
            .ok_or_else(|| {
                RenderError::Failed(format!("{} is not a page", content.source_path()))
            })?;
        out.write_all(page_document(page).into_string().as_bytes())?;
        Ok(())
    }
}

fn page_document(page: &Page) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (page.title) }
                @if let Some(description) = &page.description {
                    meta name="description" content=(description);
                }
                @if let Some(url) = &page.url {
                    link rel="canonical" href=(url);
                }
            }
            body {
                main {
                    article {
                        (PreEscaped(&page.html))
                    }
                }
            }
        }
    }
}
