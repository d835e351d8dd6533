//! # sitekiln
//!
//! A content build engine. It scans a content tree, decides what every file
//! is, and then either serves the result live or writes it all to disk.
//!
//! # Architecture: Prepare, Then Serve or Generate
//!
//! ```text
//! content/ ─▶ 1. Scan      classify each file: static asset or content item
//!             2. Process   stale static assets → build root (copy / resize)
//!             3. Route     each item's controller names its URL patterns
//!             4. Format    cross-links, external links, ... over every item
//!
//!          ─▶ serve     watcher keeps the maps fresh, requests render live
//!          ─▶ generate  every exact URL rendered into the build root
//! ```
//!
//! Serve and generate render through the same [`engine::Engine::render`], so
//! a page looks the same whichever way it was produced.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `sitekiln.toml` loading, validation, merging over stock defaults |
//! | [`content`] | Content item, loader and controller contracts |
//! | [`registry`] | Path pattern → (loader, controller) registrations |
//! | [`pages`] | Built-in front-matter page loader and controller (markdown, HTML) |
//! | [`format`] | Formatter chain and the built-in HTML formatters |
//! | [`imaging`] | Pure-Rust image operations: identify, plan and write size variants |
//! | [`process`] | Static asset processors: copy and image variants, staleness by mtime |
//! | [`scan`] | Content tree walk and per-file classification |
//! | [`store`] | Content store: loaded items and claimed static files |
//! | [`routes`] | Route table and route captures |
//! | [`engine`] | Engine context, prepare pipeline, renderer, incremental updates |
//! | [`generate`] | Writes every URL of every item to the build root |
//! | [`watch`] | Filesystem watcher driving incremental updates |
//! | [`server`] | HTTP front door for serve mode |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Register, Then Bind
//!
//! Processors, registrations and formatters are collected on an
//! [`engine::EngineBuilder`] and frozen into an [`engine::Engine`]. Plug-ins
//! never hold a reference back to the engine; a formatter that needs another
//! item's URL gets a [`format::ContentResolver`] for the duration of the call.
//!
//! ## Failures Stay Local
//!
//! One broken file never stops a pass. Load, process, route and format
//! failures are logged and collected into a [`engine::PrepareReport`];
//! generate failures into a [`generate::GenerateReport`]. Only a missing
//! content root aborts.
//!
//! ## No Lock Across a Controller Call
//!
//! The store and the route table each sit behind their own lock, and each
//! item behind its own. Formatting works on a detached copy that is swapped
//! in when it succeeds, so a failed format leaves the previous HTML in place
//! and a reader never waits on a formatter.

pub mod config;
pub mod content;
pub mod engine;
pub mod format;
pub mod generate;
pub mod imaging;
pub mod output;
pub mod pages;
pub mod process;
pub mod registry;
pub mod routes;
pub mod scan;
pub mod server;
pub mod store;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
