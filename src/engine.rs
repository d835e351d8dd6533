//! The engine context: plug-ins, shared maps and the passes over them.
//!
//! ## Construction
//!
//! Plug-ins are registered on an [`EngineBuilder`] and bound into an
//! [`Engine`] by [`EngineBuilder::build`]. After that the processor list,
//! registry and formatter chain never change; only the content store and the
//! route table mutate, each behind its own lock.
//!
//! ## Prepare Pipeline
//!
//! ```text
//! loading = true
//! 1. Scan      walk content root, classify every file (parallel)
//! 2. Process   run stale static assets through their processor (parallel)
//! 3. Route     ask each item's controller for its route patterns
//! 4. Format    run the formatter chain over each item (parallel)
//! loading = false
//! ```
//!
//! Formatting starts only after every item is in the store, so formatters
//! can resolve references to any other item. While `loading` is set the
//! renderer answers every request with [`LOADING_PLACEHOLDER`].
//!
//! Per-item failures never abort a pass; they are logged and collected in
//! the [`PrepareReport`].

use crate::config::{ContentKind, SiteConfig};
use crate::content::{ContentController, ContentLoader, RenderError};
use crate::format::{ContentResolver, FormatError, FormatPass, Formatter, FormatterChain};
use crate::imaging::ImageBackend;
use crate::pages::{PageController, PageLoader};
use crate::process::{ProcessError, StaticProcessor, processors_from_config};
use crate::registry::ContentRegistry;
use crate::routes::{RouteCaptures, RouteTable};
use crate::scan::{Classification, Classifier, ScanError, discover_files};
use crate::store::{ContentEntry, ContentStore};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Body served for every request while a full prepare is running.
pub const LOADING_PLACEHOLDER: &str = "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"UTF-8\"><meta http-equiv=\"refresh\" content=\"2\"><title>Loading…</title></head><body><p>The site is being rebuilt. This page will refresh shortly.</p></body></html>\n";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid content pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Processor setup failed: {0}")]
    Process(#[from] ProcessError),
}

/// Immutable engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub content_root: PathBuf,
    pub build_root: PathBuf,
    pub include_drafts: bool,
    pub default_document: String,
    pub debounce: Duration,
}

impl EngineSettings {
    pub fn new(content_root: impl Into<PathBuf>, build_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            build_root: build_root.into(),
            include_drafts: false,
            default_document: "index.html".to_string(),
            debounce: Duration::from_millis(100),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            content_root: PathBuf::from(&config.content_root),
            build_root: PathBuf::from(&config.build_root),
            include_drafts: config.include_drafts,
            default_document: config.default_document.clone(),
            debounce: Duration::from_millis(config.watch.debounce_ms),
        }
    }
}

/// One failed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub path: String,
    pub message: String,
}

impl Failure {
    pub fn new(path: &str, error: impl std::fmt::Display) -> Self {
        Self {
            path: path.to_string(),
            message: error.to_string(),
        }
    }
}

/// What a prepare pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrepareReport {
    /// Items in the content store.
    pub content: usize,
    /// Files claimed by a static processor.
    pub statics: usize,
    /// Items skipped because they are drafts.
    pub drafts: usize,
    /// Files nothing claimed.
    pub unmatched: usize,
    /// Static files that were stale and went through their processor.
    pub processed: usize,
    /// Output files written by the processed static files.
    pub outputs_written: usize,
    /// Entries in the route table.
    pub routes: usize,
    pub load_errors: Vec<Failure>,
    pub process_errors: Vec<Failure>,
    pub route_errors: Vec<Failure>,
    pub format_errors: Vec<Failure>,
}

impl PrepareReport {
    pub fn error_count(&self) -> usize {
        self.load_errors.len()
            + self.process_errors.len()
            + self.route_errors.len()
            + self.format_errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.error_count() == 0
    }
}

/// Result of a render call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A route matched and its controller wrote the page.
    Rendered {
        target: String,
        captures: RouteCaptures,
    },
    /// No route matched; the caller may fall through.
    NotHandled,
    /// A full prepare is running; the placeholder was written.
    Loading,
}

/// Result of re-classifying one changed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Static file re-output.
    Processed { outputs: usize },
    /// Content item reloaded, re-routed and re-formatted.
    ///
    /// `errors` holds route patterns that did not compile and a format
    /// failure, if any; the item is in the store either way.
    Reloaded { routes: usize, errors: Vec<Failure> },
    /// Path is now a draft or unmatched; any previous entry was removed.
    Dropped,
    /// Load or processing failed; previous state kept.
    Failed(String),
}

pub struct EngineBuilder {
    settings: EngineSettings,
    processors: Vec<Arc<dyn StaticProcessor>>,
    registry: ContentRegistry,
    formatters: FormatterChain,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            processors: Vec::new(),
            registry: ContentRegistry::new(),
            formatters: FormatterChain::new(),
        }
    }

    /// Builder with the processors, registrations and formatters a config names.
    pub fn from_config(
        config: &SiteConfig,
        backend: Arc<dyn ImageBackend>,
    ) -> Result<Self, EngineError> {
        let settings = EngineSettings::from_config(config);
        let mut builder = Self::new(settings);

        for processor in processors_from_config(
            config,
            &builder.settings.content_root,
            &builder.settings.build_root,
            backend,
        )? {
            builder.add_processor(processor);
        }

        for content in &config.content {
            let (kind, loader) = match content.kind {
                ContentKind::Markdown => ("markdown", PageLoader::markdown()),
                ContentKind::Html => ("html", PageLoader::html()),
            };
            builder.register_content(
                &content.pattern,
                kind,
                Arc::new(loader),
                Arc::new(PageController::new(content.routes.clone())),
            )?;
        }

        builder.formatters = FormatterChain::from_kinds(&config.formatters);
        Ok(builder)
    }

    pub fn add_processor(&mut self, processor: Arc<dyn StaticProcessor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    pub fn register_content(
        &mut self,
        pattern: &str,
        kind: &str,
        loader: Arc<dyn ContentLoader>,
        controller: Arc<dyn ContentController>,
    ) -> Result<&mut Self, EngineError> {
        self.registry.register(pattern, kind, loader, controller)?;
        Ok(self)
    }

    pub fn add_formatter(&mut self, formatter: Arc<dyn Formatter>) -> &mut Self {
        self.formatters.push(formatter);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            settings: self.settings,
            processors: self.processors,
            registry: self.registry,
            formatters: self.formatters,
            store: ContentStore::new(),
            routes: RouteTable::new(),
            loading: AtomicBool::new(false),
        }
    }
}

pub struct Engine {
    settings: EngineSettings,
    processors: Vec<Arc<dyn StaticProcessor>>,
    registry: ContentRegistry,
    formatters: FormatterChain,
    store: ContentStore,
    routes: RouteTable,
    loading: AtomicBool,
}

impl Engine {
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn registry(&self) -> &ContentRegistry {
        &self.registry
    }

    pub fn processors(&self) -> &[Arc<dyn StaticProcessor>] {
        &self.processors
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    pub fn content_root(&self) -> &Path {
        &self.settings.content_root
    }

    fn classifier(&self) -> Classifier<'_> {
        Classifier {
            root: &self.settings.content_root,
            processors: &self.processors,
            registry: &self.registry,
            include_drafts: self.settings.include_drafts,
        }
    }

    // ------------------------------------------------------------------
    // Prepare
    // ------------------------------------------------------------------

    /// Rebuild every map from the content root.
    ///
    /// Only a missing or unreadable content root is an error; per-file
    /// failures land in the report.
    pub fn prepare(&self) -> Result<PrepareReport, ScanError> {
        self.loading.store(true, Ordering::Relaxed);
        let result = self.prepare_pass();
        self.loading.store(false, Ordering::Relaxed);
        result
    }

    fn prepare_pass(&self) -> Result<PrepareReport, ScanError> {
        self.routes.clear();
        self.store.clear();

        let mut report = PrepareReport::default();
        self.scan_pass(&mut report)?;
        self.process_pass(&mut report);
        self.route_pass(&mut report);
        self.format_pass(&mut report);
        report.routes = self.routes.len();

        log::info!(
            "prepared {} content items, {} static files ({} processed), {} routes, {} errors",
            report.content,
            report.statics,
            report.processed,
            report.routes,
            report.error_count()
        );
        Ok(report)
    }

    fn scan_pass(&self, report: &mut PrepareReport) -> Result<(), ScanError> {
        let files = discover_files(&self.settings.content_root)?;
        let classifier = self.classifier();
        let outcomes: Vec<(String, Classification)> = files
            .into_par_iter()
            .map(|path| {
                let outcome = classifier.classify(&path);
                (path, outcome)
            })
            .collect();

        for (path, outcome) in outcomes {
            match outcome {
                Classification::Static(processor) => {
                    self.store.insert_static(&path, processor);
                    report.statics += 1;
                }
                Classification::Content(entry) => {
                    self.store.insert_content(&path, entry);
                    report.content += 1;
                }
                Classification::DraftSkipped => {
                    log::debug!("{}: draft, skipped", path);
                    report.drafts += 1;
                }
                Classification::Unmatched => {
                    log::debug!("{}: no processor or registration", path);
                    report.unmatched += 1;
                }
                Classification::Error(e) => {
                    log::warn!("{}: {}", path, e);
                    report.load_errors.push(Failure::new(&path, e));
                }
            }
        }
        Ok(())
    }

    fn process_pass(&self, report: &mut PrepareReport) {
        let results: Vec<(String, Result<Vec<PathBuf>, ProcessError>)> = self
            .store
            .static_entries()
            .into_par_iter()
            .filter(|(path, processor)| processor.is_stale(path))
            .map(|(path, processor)| {
                let result = processor.output(&path);
                (path, result)
            })
            .collect();

        for (path, result) in results {
            match result {
                Ok(written) => {
                    report.processed += 1;
                    report.outputs_written += written.len();
                }
                Err(e) => {
                    log::warn!("{}: {}", path, e);
                    report.process_errors.push(Failure::new(&path, e));
                }
            }
        }
    }

    fn route_pass(&self, report: &mut PrepareReport) {
        for (path, entry) in self.store.content_entries() {
            for failure in self.register_routes(&path, &entry) {
                report.route_errors.push(failure);
            }
        }
    }

    /// Replace the routes of `path` with what its controller says now.
    fn register_routes(&self, path: &str, entry: &ContentEntry) -> Vec<Failure> {
        let patterns = entry.read(|content| entry.controller().routes(content));
        self.routes
            .replace_target(path, &patterns)
            .into_iter()
            .map(|(pattern, e)| {
                log::warn!("{}: route '{}' does not compile: {}", path, pattern, e);
                Failure::new(path, format!("route '{}': {}", pattern, e))
            })
            .collect()
    }

    fn format_pass(&self, report: &mut PrepareReport) {
        let failures: Vec<Failure> = self
            .store
            .content_entries()
            .par_iter()
            .filter_map(|(path, entry)| {
                self.format_item(path, entry)
                    .err()
                    .map(|e| Failure::new(path, e))
            })
            .collect();

        for failure in &failures {
            log::warn!("{}: {}", failure.path, failure.message);
        }
        report.format_errors = failures;
    }

    /// Format one item on a copy and swap it in only when every step succeeds.
    fn format_item(&self, path: &str, entry: &ContentEntry) -> Result<(), FormatError> {
        let mut working = entry.snapshot();
        let pass = FormatPass::new(&self.formatters, self);
        entry
            .controller()
            .apply_formatting(working.as_mut(), &pass)?;
        let html = pass.format(working.html(), path)?;
        working.set_html(html);
        entry.replace(working);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Render
    // ------------------------------------------------------------------

    /// Render the item answering `url` into `out`.
    pub fn render(&self, url: &str, out: &mut dyn Write) -> Result<RenderOutcome, RenderError> {
        if self.is_loading() {
            out.write_all(LOADING_PLACEHOLDER.as_bytes())?;
            return Ok(RenderOutcome::Loading);
        }

        let Some(found) = self.routes.resolve(url) else {
            return Ok(RenderOutcome::NotHandled);
        };
        // The route can outlive its item by a moment during a watch update.
        let Some(entry) = self.store.get_content(&found.target) else {
            return Ok(RenderOutcome::NotHandled);
        };

        entry.read(|content| entry.controller().render(content, &found.captures, out))?;
        Ok(RenderOutcome::Rendered {
            target: found.target,
            captures: found.captures,
        })
    }

    // ------------------------------------------------------------------
    // Incremental updates
    // ------------------------------------------------------------------

    /// Re-classify one created or modified path and apply the result.
    pub fn apply_change(&self, path: &str) -> ChangeOutcome {
        match self.classifier().classify(path) {
            Classification::Static(processor) => {
                self.remove_content(path);
                self.store.insert_static(path, processor.clone());
                match processor.output(path) {
                    Ok(written) => ChangeOutcome::Processed {
                        outputs: written.len(),
                    },
                    Err(e) => {
                        log::warn!("{}: {}", path, e);
                        ChangeOutcome::Failed(e.to_string())
                    }
                }
            }
            Classification::Content(entry) => {
                self.store.remove_static(path);
                self.store.insert_content(path, entry.clone());
                let mut errors = self.register_routes(path, &entry);
                if let Err(e) = self.format_item(path, &entry) {
                    log::warn!("{}: {}", path, e);
                    errors.push(Failure::new(path, e));
                }
                ChangeOutcome::Reloaded {
                    routes: self.routes.patterns_for(path).len(),
                    errors,
                }
            }
            Classification::DraftSkipped | Classification::Unmatched => {
                self.remove_content(path);
                self.store.remove_static(path);
                ChangeOutcome::Dropped
            }
            Classification::Error(e) => {
                log::warn!("{}: {} (keeping previous version)", path, e);
                ChangeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Forget a deleted path, or every path under a deleted directory.
    ///
    /// Static outputs already written stay on disk. Returns how many store
    /// entries were removed.
    pub fn apply_removal(&self, path: &str) -> usize {
        let mut removed = self.remove_entry(path);
        if removed == 0 {
            let prefix = format!("{}/", path);
            let mut nested: Vec<String> = self
                .store
                .content_paths()
                .into_iter()
                .filter(|p| p.starts_with(&prefix))
                .collect();
            nested.extend(
                self.store
                    .static_entries()
                    .into_iter()
                    .map(|(p, _)| p)
                    .filter(|p| p.starts_with(&prefix)),
            );
            for nested_path in nested {
                removed += self.remove_entry(&nested_path);
            }
        }
        removed
    }

    fn remove_entry(&self, path: &str) -> usize {
        usize::from(self.remove_content(path)) + usize::from(self.store.remove_static(path).is_some())
    }

    /// Routes go first so no route ever names a missing item for long.
    fn remove_content(&self, path: &str) -> bool {
        self.routes.remove_target(path);
        self.store.remove_content(path).is_some()
    }
}

impl ContentResolver for Engine {
    fn canonical_url(&self, source_path: &str) -> Option<String> {
        let entry = self.store.get_content(source_path)?;
        entry.read(|content| {
            content
                .canonical_url()
                .map(String::from)
                .or_else(|| entry.controller().urls(content).into_iter().next())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CrossLinkFormatter;
    use crate::process::{CopyProcessor, MatchRules, OutputLayout};
    use crate::test_helpers::{RecordingController, StubLoader, bump_mtime, write_file};
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
            }
        }

        fn content(&self) -> PathBuf {
            self.tmp.path().join("content")
        }

        fn dist(&self) -> PathBuf {
            self.tmp.path().join("dist")
        }

        fn write(&self, rel: &str, body: &str) {
            write_file(&self.content(), rel, body);
        }

        fn builder(&self, include_drafts: bool) -> EngineBuilder {
            let mut settings = EngineSettings::new(self.content(), self.dist());
            settings.include_drafts = include_drafts;
            let mut builder = EngineBuilder::new(settings);
            builder.add_processor(Arc::new(CopyProcessor::new(
                "files",
                MatchRules::new("", &["txt".to_string()], &[]).unwrap(),
                OutputLayout::new(&self.content(), &self.dist(), "", ""),
            )));
            builder
        }

        /// Copy `.txt`, stub-load `.md` routed at `/{stem}/`.
        fn engine(&self, include_drafts: bool) -> (Engine, Arc<RecordingController>) {
            let controller = Arc::new(RecordingController::new(&["/{stem}/"]));
            let mut builder = self.builder(include_drafts);
            builder
                .register_content(r"\.md$", "page", Arc::new(StubLoader), controller.clone())
                .unwrap();
            builder.add_formatter(Arc::new(CrossLinkFormatter));
            (builder.build(), controller)
        }
    }

    fn render(engine: &Engine, url: &str) -> (RenderOutcome, String) {
        let mut out = Vec::new();
        let outcome = engine.render(url, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn prepare_fills_store_routes_and_outputs() {
        let fx = Fixture::new();
        fx.write("a.txt", "static");
        fx.write("blog/post.md", "<p>post</p>");
        fx.write("data.csv", "x");
        let (engine, _) = fx.engine(false);

        let report = engine.prepare().unwrap();
        assert_eq!(report.content, 1);
        assert_eq!(report.statics, 1);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(report.outputs_written, 1);
        assert_eq!(report.routes, 1);
        assert!(report.is_clean());
        assert!(!engine.is_loading());

        assert_eq!(std::fs::read_to_string(fx.dist().join("a.txt")).unwrap(), "static");
        assert_eq!(engine.routes().patterns_for("blog/post.md"), vec!["/blog/post/"]);
    }

    #[test]
    fn prepare_twice_is_idempotent() {
        let fx = Fixture::new();
        fx.write("a.txt", "static");
        fx.write("post.md", "<p>post</p>");
        let (engine, _) = fx.engine(false);

        engine.prepare().unwrap();
        let routes_before = engine.routes().snapshot();
        let paths_before = engine.store().content_paths();

        let second = engine.prepare().unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(engine.routes().snapshot(), routes_before);
        assert_eq!(engine.store().content_paths(), paths_before);
    }

    #[test]
    fn touched_static_file_is_reprocessed_once() {
        let fx = Fixture::new();
        fx.write("a.txt", "static");
        fx.write("b.txt", "other");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        bump_mtime(&fx.content().join("a.txt"), 60);
        let report = engine.prepare().unwrap();
        assert_eq!(report.processed, 1);
    }

    #[test]
    fn missing_content_root_is_error() {
        let fx = Fixture::new();
        let (engine, _) = fx.engine(false);
        assert!(matches!(engine.prepare(), Err(ScanError::MissingRoot(_))));
        assert!(!engine.is_loading());
    }

    #[test]
    fn drafts_excluded_by_default() {
        let fx = Fixture::new();
        fx.write("wip.md", "DRAFT\n<p>soon</p>");

        let (engine, _) = fx.engine(false);
        let report = engine.prepare().unwrap();
        assert_eq!(report.drafts, 1);
        assert!(engine.store().get_content("wip.md").is_none());
        assert!(engine.routes().patterns_for("wip.md").is_empty());

        let (engine, _) = fx.engine(true);
        let report = engine.prepare().unwrap();
        assert_eq!(report.drafts, 0);
        assert!(engine.store().get_content("wip.md").is_some());
        assert_eq!(engine.routes().patterns_for("wip.md"), vec!["/wip/"]);
    }

    #[test]
    fn load_errors_are_isolated() {
        let fx = Fixture::new();
        fx.write("bad.md", "BROKEN\n");
        fx.write("good.md", "<p>ok</p>");
        let (engine, _) = fx.engine(false);

        let report = engine.prepare().unwrap();
        assert_eq!(report.content, 1);
        assert_eq!(report.load_errors.len(), 1);
        assert_eq!(report.load_errors[0].path, "bad.md");
    }

    #[test]
    fn cross_links_resolve_across_items() {
        let fx = Fixture::new();
        fx.write("a.md", r#"<a href="@/b.md#top">b</a>"#);
        fx.write("b.md", "<p>b</p>");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        let (_, body) = render(&engine, "/a/");
        assert_eq!(body, r#"<a href="/b/#top">b</a>"#);
    }

    #[test]
    fn format_failure_keeps_unformatted_html() {
        let fx = Fixture::new();
        fx.write("a.md", r#"<a href="@/missing.md">x</a> <a href="@/b.md">b</a>"#);
        fx.write("b.md", "<p>b</p>");
        let (engine, _) = fx.engine(false);

        let report = engine.prepare().unwrap();
        assert_eq!(report.format_errors.len(), 1);
        assert_eq!(report.format_errors[0].path, "a.md");

        let (_, body) = render(&engine, "/a/");
        assert_eq!(body, r#"<a href="@/missing.md">x</a> <a href="@/b.md">b</a>"#);
    }

    #[test]
    fn bad_route_pattern_is_counted() {
        let fx = Fixture::new();
        fx.write("a.md", "x");
        let mut builder = fx.builder(false);
        builder
            .register_content(
                r"\.md$",
                "page",
                Arc::new(StubLoader),
                Arc::new(RecordingController::new(&["/ok/", "/bad(/"])),
            )
            .unwrap();
        let engine = builder.build();

        let report = engine.prepare().unwrap();
        assert_eq!(report.route_errors.len(), 1);
        assert_eq!(report.routes, 1);
    }

    #[test]
    fn render_dispatches_with_captures() {
        let fx = Fixture::new();
        fx.write("page-hello.md", "hello body");
        let controller = Arc::new(RecordingController::new(&["/pages/(hello)/"]));
        let mut builder = fx.builder(false);
        builder
            .register_content(r"page-([a-z]+)\.md$", "page", Arc::new(StubLoader), controller.clone())
            .unwrap();
        let engine = builder.build();
        engine.prepare().unwrap();

        let (outcome, body) = render(&engine, "/pages/hello/");
        assert_eq!(body, "hello body");
        let RenderOutcome::Rendered { target, captures } = outcome else {
            panic!("expected a render");
        };
        assert_eq!(target, "page-hello.md");
        assert_eq!(captures.get(1), Some("hello"));
        assert_eq!(
            controller.renders(),
            vec![("page-hello.md".to_string(), vec![Some("hello".to_string())])]
        );

        assert_eq!(render(&engine, "/pages/other/").0, RenderOutcome::NotHandled);
    }

    #[test]
    fn render_while_loading_writes_placeholder() {
        let fx = Fixture::new();
        fx.write("a.md", "x");
        let (engine, controller) = fx.engine(false);
        engine.prepare().unwrap();

        engine.loading.store(true, Ordering::Relaxed);
        let (outcome, body) = render(&engine, "/a/");
        assert_eq!(outcome, RenderOutcome::Loading);
        assert_eq!(body, LOADING_PLACEHOLDER);
        assert!(controller.renders().is_empty());
    }

    #[test]
    fn canonical_url_prefers_first_url() {
        let fx = Fixture::new();
        fx.write("a.md", "x");
        let controller = Arc::new(RecordingController::new(&["/first/", "/second/"]));
        let mut builder = fx.builder(false);
        builder
            .register_content(r"\.md$", "page", Arc::new(StubLoader), controller)
            .unwrap();
        let engine = builder.build();
        engine.prepare().unwrap();

        assert_eq!(engine.canonical_url("a.md").as_deref(), Some("/first/"));
        assert_eq!(engine.canonical_url("nope.md"), None);
    }

    // =========================================================================
    // Incremental updates
    // =========================================================================

    #[test]
    fn change_reloads_content() {
        let fx = Fixture::new();
        fx.write("a.md", "one");
        let mut builder = fx.builder(false);
        builder
            .register_content(
                r"\.md$",
                "page",
                Arc::new(StubLoader),
                Arc::new(RecordingController::new(&["/{stem}/"])),
            )
            .unwrap();
        let engine = builder.build();
        engine.prepare().unwrap();

        fx.write("a.md", "two");
        assert_eq!(
            engine.apply_change("a.md"),
            ChangeOutcome::Reloaded {
                routes: 1,
                errors: vec![]
            }
        );
        assert_eq!(render(&engine, "/a/").1, "two");
    }

    #[test]
    fn change_with_broken_link_reports_format_error() {
        let fx = Fixture::new();
        fx.write("a.md", "<p>a</p>");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        fx.write("a.md", r#"<a href="@/gone.md">x</a>"#);
        let ChangeOutcome::Reloaded { routes, errors } = engine.apply_change("a.md") else {
            panic!("expected a.md to reload");
        };
        assert_eq!(routes, 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "a.md");
        assert!(errors[0].message.contains("gone.md"), "{}", errors[0].message);
        assert_eq!(render(&engine, "/a/").1, r#"<a href="@/gone.md">x</a>"#);
    }

    #[test]
    fn change_on_static_outputs_immediately() {
        let fx = Fixture::new();
        let (engine, _) = fx.engine(false);
        fx.write("new.txt", "fresh");

        assert_eq!(engine.apply_change("new.txt"), ChangeOutcome::Processed { outputs: 1 });
        assert_eq!(std::fs::read_to_string(fx.dist().join("new.txt")).unwrap(), "fresh");
        assert!(engine.store().get_static("new.txt").is_some());
    }

    #[test]
    fn change_to_draft_drops_entry() {
        let fx = Fixture::new();
        fx.write("a.md", "live");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        fx.write("a.md", "DRAFT\nlater");
        assert_eq!(engine.apply_change("a.md"), ChangeOutcome::Dropped);
        assert!(engine.store().get_content("a.md").is_none());
        assert!(engine.routes().is_empty());
    }

    #[test]
    fn broken_change_keeps_previous_version() {
        let fx = Fixture::new();
        fx.write("a.md", "good");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        fx.write("a.md", "BROKEN\n");
        assert!(matches!(engine.apply_change("a.md"), ChangeOutcome::Failed(_)));
        assert_eq!(render(&engine, "/a/").1, "good");
    }

    #[test]
    fn removal_prunes_routes_and_keeps_outputs() {
        let fx = Fixture::new();
        fx.write("a.md", "x");
        fx.write("a.txt", "static");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        assert_eq!(engine.apply_removal("a.md"), 1);
        assert!(engine.routes().patterns_for("a.md").is_empty());
        assert_eq!(engine.apply_removal("a.txt"), 1);
        assert!(fx.dist().join("a.txt").exists());
        assert_eq!(engine.apply_removal("a.txt"), 0);
    }

    #[test]
    fn removing_a_directory_removes_nested_entries() {
        let fx = Fixture::new();
        fx.write("blog/a.md", "x");
        fx.write("blog/b.txt", "y");
        fx.write("blogroll.md", "z");
        let (engine, _) = fx.engine(false);
        engine.prepare().unwrap();

        assert_eq!(engine.apply_removal("blog"), 2);
        assert_eq!(engine.store().content_paths(), vec!["blogroll.md"]);
        assert_eq!(engine.store().static_len(), 0);
    }

    #[test]
    fn builder_from_config_registers_pages() {
        use crate::imaging::RustBackend;

        let fx = Fixture::new();
        fx.write("index.md", "# Home\n\nSee [post](@/blog/post.md).");
        fx.write("blog/post.md", "+++\ntitle = \"Post\"\n+++\nHello <https://example.com>");

        let mut config = SiteConfig::default();
        config.content_root = fx.content().to_string_lossy().into_owned();
        config.build_root = fx.dist().to_string_lossy().into_owned();
        let engine = EngineBuilder::from_config(&config, Arc::new(RustBackend::new()))
            .unwrap()
            .build();

        let report = engine.prepare().unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.content, 2);

        let (_, home) = render(&engine, "/");
        assert!(home.contains(r#"<a href="/blog/post/">post</a>"#));
        let (_, post) = render(&engine, "/blog/post/");
        assert!(post.contains("<title>Post</title>"));
        assert!(post.contains(r#"rel="noopener noreferrer""#));
    }
}
