//! CLI output formatting for prepare, routes and generate.
//!
//! # Output Format
//!
//! ## Prepare
//!
//! ```text
//! Scan
//!     12 content items
//!     40 static files
//!     3 drafts skipped
//!     2 unmatched
//! Process
//!     5 processed → 9 outputs
//! Routes
//!     14 registered
//! Errors (1)
//!     load bad.md: front matter: expected `=`
//! ```
//!
//! ## Routes
//!
//! ```text
//! /                    → index.md
//! /blog/post/          → blog/post.md
//! ```
//!
//! ## Generate
//!
//! ```text
//! /           → index.html
//! /blog/post/ → blog/post/index.html
//!
//! Generated 2 files from 2 items
//! ```
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::engine::{Failure, PrepareReport};
use crate::generate::GenerateReport;
use crate::routes::RouteInfo;
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `n noun` with a plain `s` plural.
fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

fn error_lines(label: &str, failures: &[Failure]) -> impl Iterator<Item = String> {
    failures
        .iter()
        .map(move |f| format!("{}{} {}: {}", indent(1), label, f.path, f.message))
}

/// Pad every left column to the widest one.
fn arrow_table(rows: &[(String, String)]) -> Vec<String> {
    let width = rows.iter().map(|(left, _)| left.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(left, right)| format!("{:<width$} \u{2192} {}", left, right, width = width))
        .collect()
}

// ============================================================================
// Prepare
// ============================================================================

pub fn format_prepare_report(report: &PrepareReport) -> Vec<String> {
    let mut lines = vec!["Scan".to_string()];
    lines.push(format!("{}{}", indent(1), count(report.content, "content item")));
    lines.push(format!("{}{}", indent(1), count(report.statics, "static file")));
    if report.drafts > 0 {
        lines.push(format!("{}{} skipped", indent(1), count(report.drafts, "draft")));
    }
    if report.unmatched > 0 {
        lines.push(format!("{}{} unmatched", indent(1), report.unmatched));
    }

    lines.push("Process".to_string());
    if report.processed == 0 {
        lines.push(format!("{}up to date", indent(1)));
    } else {
        lines.push(format!(
            "{}{} processed \u{2192} {}",
            indent(1),
            report.processed,
            count(report.outputs_written, "output")
        ));
    }

    lines.push("Routes".to_string());
    lines.push(format!("{}{} registered", indent(1), report.routes));

    let errors = report.error_count();
    if errors > 0 {
        lines.push(format!("Errors ({})", errors));
        lines.extend(error_lines("load", &report.load_errors));
        lines.extend(error_lines("process", &report.process_errors));
        lines.extend(error_lines("route", &report.route_errors));
        lines.extend(error_lines("format", &report.format_errors));
    }
    lines
}

pub fn print_prepare_report(report: &PrepareReport) {
    for line in format_prepare_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn format_routes(routes: &[RouteInfo]) -> Vec<String> {
    if routes.is_empty() {
        return vec!["No routes".to_string()];
    }
    let rows: Vec<(String, String)> = routes
        .iter()
        .map(|r| (r.pattern.clone(), r.target.clone()))
        .collect();
    arrow_table(&rows)
}

pub fn print_routes(routes: &[RouteInfo]) {
    for line in format_routes(routes) {
        println!("{}", line);
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Written files are shown relative to `build_root`.
pub fn format_generate_report(report: &GenerateReport, build_root: &Path) -> Vec<String> {
    let mut written: Vec<(String, String)> = report
        .written
        .iter()
        .map(|file| {
            let shown = file
                .path
                .strip_prefix(build_root)
                .unwrap_or(&file.path)
                .to_string_lossy()
                .replace('\\', "/");
            (file.url.clone(), shown)
        })
        .collect();
    written.sort();

    let mut lines = arrow_table(&written);
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Generated {} from {}",
        count(report.written.len(), "file"),
        count(report.items, "item")
    ));
    if !report.errors.is_empty() {
        lines.push(format!("Errors ({})", report.errors.len()));
        lines.extend(error_lines("render", &report.errors));
    }
    lines
}

pub fn print_generate_report(report: &GenerateReport, build_root: &Path) {
    for line in format_generate_report(report, build_root) {
        println!("{}", line);
    }
}
