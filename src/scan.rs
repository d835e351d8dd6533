//! Content tree discovery and per-file classification.
//!
//! ## Classification Order
//!
//! ```text
//! path ─▶ static processors (config order) ─▶ first match → Static
//!      └▶ content registrations (config order) ─▶ first match → load
//!             ├─ loader error          → Error
//!             ├─ draft, drafts off     → DraftSkipped
//!             └─ otherwise             → Content
//!      └▶ nothing matched              → Unmatched
//! ```
//!
//! ## Ignored Paths
//!
//! Version-control directories (`.git`, `.hg`, `.svn`) and editor backup or
//! temporary files (`*~`, `*.bak`, `*.swp`, `*.tmp`, `.#*`) are invisible to
//! the scan and to the watcher. Paths are root-relative with forward slashes.

use crate::content::LoadError;
use crate::process::StaticProcessor;
use crate::registry::ContentRegistry;
use crate::store::ContentEntry;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Content root not found: {0}")]
    MissingRoot(PathBuf),
}

const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];
const BACKUP_SUFFIXES: &[&str] = &["~", ".bak", ".swp", ".tmp"];

fn is_ignored_name(name: &str) -> bool {
    VCS_DIRS.contains(&name)
        || name.starts_with(".#")
        || BACKUP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Whether a root-relative path is skipped by scan and watch alike.
pub fn is_ignored(path: &str) -> bool {
    path.split('/').any(is_ignored_name)
}

/// `path` relative to `root`, with forward slashes. `None` outside the root.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Every non-ignored file under `root`, as sorted root-relative paths.
pub fn discover_files(root: &Path) -> Result<Vec<String>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_name(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(rel) = relative_path(root, entry.path()) {
            files.push(rel);
        }
    }
    files.sort();
    Ok(files)
}

/// Outcome of classifying one path.
pub enum Classification {
    Static(Arc<dyn StaticProcessor>),
    Content(Arc<ContentEntry>),
    DraftSkipped,
    Unmatched,
    Error(LoadError),
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Static(_) => "static",
            Classification::Content(_) => "content",
            Classification::DraftSkipped => "draft",
            Classification::Unmatched => "unmatched",
            Classification::Error(_) => "error",
        }
    }
}

impl std::fmt::Debug for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Static(p) => write!(f, "Static({})", p.name()),
            Classification::Error(e) => write!(f, "Error({})", e),
            other => f.write_str(other.label()),
        }
    }
}

/// Decides what a path is. Holds only immutable engine parts.
pub struct Classifier<'a> {
    pub root: &'a Path,
    pub processors: &'a [Arc<dyn StaticProcessor>],
    pub registry: &'a ContentRegistry,
    pub include_drafts: bool,
}

impl Classifier<'_> {
    pub fn classify(&self, path: &str) -> Classification {
        if let Some(processor) = self.processors.iter().find(|p| p.matches(path)) {
            return Classification::Static(processor.clone());
        }

        let Some(found) = self.registry.match_path(path) else {
            return Classification::Unmatched;
        };

        let file = match File::open(self.root.join(path)) {
            Ok(file) => file,
            Err(e) => return Classification::Error(LoadError::Io(e)),
        };
        let mut reader = BufReader::new(file);

        match found.registration.loader().load(&found.source, &mut reader) {
            Ok(content) if content.is_draft() && !self.include_drafts => {
                Classification::DraftSkipped
            }
            Ok(content) => Classification::Content(Arc::new(ContentEntry::new(
                content,
                found.registration.controller().clone(),
            ))),
            Err(e) => Classification::Error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CopyProcessor, MatchRules, OutputLayout};
    use crate::test_helpers::{RecordingController, StubLoader, write_file};
    use tempfile::TempDir;

    fn copy_txt(root: &Path) -> Arc<dyn StaticProcessor> {
        Arc::new(CopyProcessor::new(
            "files",
            MatchRules::new("", &["txt".to_string()], &[]).unwrap(),
            OutputLayout::new(root, &root.join("../dist"), "", ""),
        ))
    }

    fn registry() -> ContentRegistry {
        let mut registry = ContentRegistry::new();
        registry
            .register(
                r"\.(md|txt)$",
                "page",
                Arc::new(StubLoader),
                Arc::new(RecordingController::new(&["/{stem}/"])),
            )
            .unwrap();
        registry
    }

    fn classify(root: &Path, path: &str, include_drafts: bool) -> Classification {
        let processors = vec![copy_txt(root)];
        let registry = registry();
        Classifier {
            root,
            processors: &processors,
            registry: &registry,
            include_drafts,
        }
        .classify(path)
    }

    #[test]
    fn ignored_paths() {
        assert!(is_ignored(".git/config"));
        assert!(is_ignored("blog/.svn/entries"));
        assert!(is_ignored("post.md~"));
        assert!(is_ignored("post.md.swp"));
        assert!(is_ignored("a/b.bak"));
        assert!(is_ignored("x.tmp"));
        assert!(is_ignored("blog/.#post.md"));
        assert!(!is_ignored("blog/post.md"));
        assert!(!is_ignored(".well-known/security.txt"));
        assert!(!is_ignored("gitignore.txt"));
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("/site/content");
        assert_eq!(
            relative_path(root, &root.join("blog").join("post.md")).as_deref(),
            Some("blog/post.md")
        );
        assert_eq!(relative_path(root, root), None);
        assert_eq!(relative_path(root, Path::new("/elsewhere/a.md")), None);
    }

    #[test]
    fn discover_skips_ignored_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_file(root, "b.md", "");
        write_file(root, "a/c.md", "");
        write_file(root, ".git/HEAD", "");
        write_file(root, "a/c.md~", "");
        write_file(root, ".#b.md", "");

        let files = discover_files(root).unwrap();
        assert_eq!(files, vec!["a/c.md", "b.md"]);
    }

    #[test]
    fn discover_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_files(&tmp.path().join("nope")),
            Err(ScanError::MissingRoot(_))
        ));
    }

    #[test]
    fn static_processors_win_over_registrations() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.txt", "hello");
        let result = classify(tmp.path(), "a.txt", false);
        assert!(matches!(result, Classification::Static(ref p) if p.name() == "files"));
    }

    #[test]
    fn content_is_loaded_with_its_controller() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "post.md", "<p>hi</p>");
        let Classification::Content(entry) = classify(tmp.path(), "post.md", false) else {
            panic!("expected content");
        };
        assert_eq!(entry.read(|c| c.html().to_string()), "<p>hi</p>");
        let routes = entry.read(|c| entry.controller().routes(c));
        assert_eq!(routes, vec!["/post/"]);
    }

    #[test]
    fn drafts_follow_setting() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "wip.md", "DRAFT\nbody");
        assert!(matches!(
            classify(tmp.path(), "wip.md", false),
            Classification::DraftSkipped
        ));
        assert!(matches!(
            classify(tmp.path(), "wip.md", true),
            Classification::Content(_)
        ));
    }

    #[test]
    fn loader_failure_is_error() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "bad.md", "BROKEN\n");
        let result = classify(tmp.path(), "bad.md", false);
        assert_eq!(result.label(), "error");
    }

    #[test]
    fn missing_file_is_error_not_panic() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            classify(tmp.path(), "gone.md", false),
            Classification::Error(LoadError::Io(_))
        ));
    }

    #[test]
    fn unknown_extension_is_unmatched() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "data.csv", "a,b");
        assert!(matches!(
            classify(tmp.path(), "data.csv", false),
            Classification::Unmatched
        ));
    }
}
