//! Content store: every loaded item and every claimed static file.
//!
//! Two maps, each behind its own lock, keyed by root-relative path:
//!
//! - content path → [`ContentEntry`] (loaded item + owning controller)
//! - static path → the processor that claimed it
//!
//! A path lives in at most one of the two maps. Maps are ordered so passes
//! that walk them (route building, generation) see a stable order.

use crate::content::{Content, ContentController};
use crate::process::StaticProcessor;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A loaded item paired with the controller of the registration that loaded it.
pub struct ContentEntry {
    content: RwLock<Box<dyn Content>>,
    controller: Arc<dyn ContentController>,
}

impl ContentEntry {
    pub fn new(content: Box<dyn Content>, controller: Arc<dyn ContentController>) -> Self {
        Self {
            content: RwLock::new(content),
            controller,
        }
    }

    pub fn controller(&self) -> &Arc<dyn ContentController> {
        &self.controller
    }

    /// Run `f` against the item under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&dyn Content) -> R) -> R {
        let guard = self.content.read().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_ref())
    }

    /// Detached copy of the item.
    pub fn snapshot(&self) -> Box<dyn Content> {
        self.read(|content| content.clone_box())
    }

    /// Swap in a new version of the item.
    pub fn replace(&self, content: Box<dyn Content>) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = content;
    }
}

#[derive(Default)]
pub struct ContentStore {
    content: RwLock<BTreeMap<String, Arc<ContentEntry>>>,
    statics: RwLock<BTreeMap<String, Arc<dyn StaticProcessor>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_content(&self, path: &str, entry: Arc<ContentEntry>) -> Option<Arc<ContentEntry>> {
        self.content
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), entry)
    }

    pub fn get_content(&self, path: &str) -> Option<Arc<ContentEntry>> {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn remove_content(&self, path: &str) -> Option<Arc<ContentEntry>> {
        self.content
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    /// All content entries, in path order. The lock is released on return.
    pub fn content_entries(&self) -> Vec<(String, Arc<ContentEntry>)> {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect()
    }

    pub fn content_paths(&self) -> Vec<String> {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn content_len(&self) -> usize {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn insert_static(
        &self,
        path: &str,
        processor: Arc<dyn StaticProcessor>,
    ) -> Option<Arc<dyn StaticProcessor>> {
        self.statics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), processor)
    }

    pub fn get_static(&self, path: &str) -> Option<Arc<dyn StaticProcessor>> {
        self.statics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn remove_static(&self, path: &str) -> Option<Arc<dyn StaticProcessor>> {
        self.statics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    pub fn static_entries(&self) -> Vec<(String, Arc<dyn StaticProcessor>)> {
        self.statics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(path, processor)| (path.clone(), processor.clone()))
            .collect()
    }

    pub fn static_len(&self) -> usize {
        self.statics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.content
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.statics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
