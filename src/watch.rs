//! Filesystem watcher: keeps the engine in step with the content root.
//!
//! ## Event Flow
//!
//! ```text
//! notify ──▶ channel ──▶ coordinator ──▶ plan_event()
//!                                          ├─ Changed / Removed / Renamed ─▶ pending set ─▶ handler threads
//!                                          ├─ Ignore
//!                                          └─ Rescan ─▶ drop watcher, watch again, full prepare
//! ```
//!
//! Each path has at most one handler waiting on it. Events that arrive for
//! a path while its handler sleeps only update the action it will take.
//! Once the debounce interval is over the handler looks at the disk again:
//! a changed path that no longer exists (editors write, delete and
//! recreate) is skipped, as is a removed path that is back. A changed
//! directory is walked and every file in it reclassified. Ignored paths
//! (VCS dirs, editor backups) are skipped.
//!
//! A rename is one handler that removes the old path and then reclassifies
//! the new one. Handlers for different paths run concurrently; the engine's
//! per-map locks keep their updates consistent.
//!
//! When notify reports an error or asks for a rescan (its queue overflowed),
//! the coordinator drops its watcher, opens a fresh one (retrying with
//! backoff while the root is unavailable), and rebuilds everything with
//! [`Engine::prepare`].

use crate::engine::{ChangeOutcome, Engine};
use crate::scan::{discover_files, is_ignored, relative_path};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How often the coordinator checks for a stop request between events.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// First and longest wait between attempts to watch the root again.
const RETRY_FIRST: Duration = Duration::from_millis(250);
const RETRY_MAX: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Watch thread panicked")]
    Panicked,
}

/// What the coordinator does with one notify event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPlan {
    Changed(Vec<PathBuf>),
    Removed(Vec<PathBuf>),
    Renamed { from: PathBuf, to: PathBuf },
    Rescan,
    Ignore,
}

pub fn plan_event(event: &notify::Result<notify::Event>) -> WatchPlan {
    let event = match event {
        Ok(event) => event,
        Err(_) => return WatchPlan::Rescan,
    };
    if event.need_rescan() {
        return WatchPlan::Rescan;
    }
    let paths = event.paths.clone();
    match event.kind {
        EventKind::Access(_) | EventKind::Other => WatchPlan::Ignore,
        EventKind::Create(_) => WatchPlan::Changed(paths),
        EventKind::Remove(_) => WatchPlan::Removed(paths),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => WatchPlan::Renamed { from, to },
                _ => WatchPlan::Ignore,
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => WatchPlan::Removed(paths),
        // A bare rename could be either end; the handler looks at the disk.
        EventKind::Modify(ModifyKind::Name(_)) => WatchPlan::Changed(paths),
        EventKind::Modify(_) | EventKind::Any => WatchPlan::Changed(paths),
    }
}

/// What a handler was asked to do with one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAction {
    Change,
    Remove,
}

/// What a handler did with one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Skipped(&'static str),
    Changed(ChangeOutcome),
    /// A directory appeared or moved in; this many files under it were reclassified.
    ChangedDirectory(usize),
    Removed(usize),
}

/// Apply one debounced path to the engine. `root` is the canonical content root.
pub fn handle_path(engine: &Engine, root: &Path, path: &Path, action: PathAction) -> HandleOutcome {
    let Some(rel) = relative_path(root, path) else {
        return HandleOutcome::Skipped("outside content root");
    };
    if is_ignored(&rel) {
        return HandleOutcome::Skipped("ignored");
    }

    match action {
        PathAction::Change => {
            if !path.exists() {
                return HandleOutcome::Skipped("gone");
            }
            if path.is_dir() {
                return change_directory(engine, path, &rel);
            }
            let outcome = engine.apply_change(&rel);
            log::debug!("{}: {:?}", rel, outcome);
            HandleOutcome::Changed(outcome)
        }
        PathAction::Remove => {
            if path.exists() {
                return HandleOutcome::Skipped("still present");
            }
            let removed = engine.apply_removal(&rel);
            log::debug!("{}: removed {} entries", rel, removed);
            HandleOutcome::Removed(removed)
        }
    }
}

/// Reclassify every file under a directory that was created or moved in.
fn change_directory(engine: &Engine, dir: &Path, rel: &str) -> HandleOutcome {
    let files = match discover_files(dir) {
        Ok(files) => files,
        Err(e) => {
            log::debug!("{}: {}", rel, e);
            return HandleOutcome::Skipped("gone");
        }
    };
    for file in &files {
        let path = format!("{}/{}", rel, file);
        let outcome = engine.apply_change(&path);
        log::debug!("{}: {:?}", path, outcome);
    }
    log::debug!("{}: reclassified {} files", rel, files.len());
    HandleOutcome::ChangedDirectory(files.len())
}

/// Paths waiting out their debounce, with the latest action asked for each.
#[derive(Debug, Default)]
struct Pending {
    paths: Mutex<HashMap<PathBuf, PathAction>>,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, PathAction>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `action` for `path`. True when no handler is waiting on it yet.
    fn offer(&self, path: PathBuf, action: PathAction) -> bool {
        self.lock().insert(path, action).is_none()
    }

    /// Take the latest action for `path`; the next event starts a new handler.
    fn take(&self, path: &Path) -> Option<PathAction> {
        self.lock().remove(path)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

fn dispatch(engine: &Arc<Engine>, root: &Path, pending: &Arc<Pending>, plan: WatchPlan) {
    let jobs: Vec<Vec<(PathBuf, PathAction)>> = match plan {
        WatchPlan::Changed(paths) => paths
            .into_iter()
            .map(|p| vec![(p, PathAction::Change)])
            .collect(),
        WatchPlan::Removed(paths) => paths
            .into_iter()
            .map(|p| vec![(p, PathAction::Remove)])
            .collect(),
        WatchPlan::Renamed { from, to } => {
            vec![vec![(from, PathAction::Remove), (to, PathAction::Change)]]
        }
        WatchPlan::Rescan | WatchPlan::Ignore => Vec::new(),
    };

    for job in jobs {
        // Paths that already have a handler waiting only get their action updated.
        let fresh: Vec<PathBuf> = job
            .into_iter()
            .filter_map(|(path, action)| pending.offer(path.clone(), action).then_some(path))
            .collect();
        if fresh.is_empty() {
            continue;
        }

        let engine = engine.clone();
        let root = root.to_path_buf();
        let pending = pending.clone();
        thread::spawn(move || {
            thread::sleep(engine.settings().debounce);
            for path in fresh {
                if let Some(action) = pending.take(&path) {
                    handle_path(&engine, &root, &path, action);
                }
            }
        });
    }
    log::trace!("{} paths waiting on the debounce", pending.len());
}

/// Where the coordinator gets its events from.
struct Session {
    _watcher: Option<RecommendedWatcher>,
    events: Receiver<notify::Result<notify::Event>>,
}

fn open_session(root: &Path) -> Result<Session, WatchError> {
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(Session {
        _watcher: Some(watcher),
        events: rx,
    })
}

/// Open a new session, waiting longer after each failure.
///
/// Returns `None` only when a stop was requested in the meantime.
fn reopen<F>(open: &mut F, root: &Path, stop: &AtomicBool) -> Option<Session>
where
    F: FnMut(&Path) -> Result<Session, WatchError>,
{
    let mut delay = RETRY_FIRST;
    loop {
        match open(root) {
            Ok(session) => return Some(session),
            Err(e) => {
                log::error!(
                    "cannot watch {}: {} (retrying in {:?})",
                    root.display(),
                    e,
                    delay
                );
            }
        }
        thread::sleep(delay);
        if stop.load(Ordering::Relaxed) {
            return None;
        }
        delay = (delay * 2).min(RETRY_MAX);
    }
}

fn recover(engine: &Engine) {
    match engine.prepare() {
        Ok(report) => log::info!(
            "rebuilt {} content items and {} static files",
            report.content,
            report.statics
        ),
        Err(e) => log::error!("rebuild failed: {}", e),
    }
}

/// A running watcher. Dropping it leaves the thread running; call [`stop`](Self::stop).
pub struct WatchHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl WatchHandle {
    /// Ask the coordinator to exit and wait for it.
    pub fn stop(self) -> Result<(), WatchError> {
        self.stop.store(true, Ordering::Relaxed);
        self.thread.join().map_err(|_| WatchError::Panicked)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Start watching the engine's content root.
///
/// The watch is registered before this returns, so any change made after
/// the call is seen.
pub fn spawn(engine: Arc<Engine>) -> Result<WatchHandle, WatchError> {
    let root = engine.content_root().canonicalize()?;
    let first = open_session(&root)?;
    log::info!("watching {}", root.display());

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let thread = thread::spawn(move || coordinate(engine, root, first, open_session, stop_flag));
    Ok(WatchHandle { stop, thread })
}

fn coordinate<F>(
    engine: Arc<Engine>,
    root: PathBuf,
    first: Session,
    mut open: F,
    stop: Arc<AtomicBool>,
) where
    F: FnMut(&Path) -> Result<Session, WatchError>,
{
    let pending = Arc::new(Pending::default());
    let mut session = first;
    while !stop.load(Ordering::Relaxed) {
        let received = session.events.recv_timeout(POLL_INTERVAL);
        let lost = match received {
            Ok(event) => match plan_event(&event) {
                WatchPlan::Rescan => {
                    log::warn!("file watcher lost events, rebuilding from scratch");
                    true
                }
                WatchPlan::Ignore => false,
                plan => {
                    dispatch(&engine, &root, &pending, plan);
                    false
                }
            },
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("file watcher went away, rebuilding from scratch");
                true
            }
        };
        if lost {
            drop(session);
            // Watch first so nothing written during the rebuild is missed.
            session = match reopen(&mut open, &root, &stop) {
                Some(session) => session,
                None => break,
            };
            recover(&engine);
        }
    }
    log::info!("stopped watching {}", root.display());
}
