//! Content registrations: path pattern → (loader, controller).
//!
//! Registrations are kept in insertion order and the first pattern that
//! matches a root-relative path claims it. Patterns are searched, not
//! anchored, so a registration that wants a whole-path match must carry its
//! own `^...$`.

use crate::content::{ContentController, ContentLoader, SourceFile};
use regex::Regex;
use std::sync::Arc;

/// One registration rule.
pub struct Registration {
    pattern: Regex,
    kind: String,
    loader: Arc<dyn ContentLoader>,
    controller: Arc<dyn ContentController>,
}

impl Registration {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Backing-type marker handed to the loader.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn loader(&self) -> &Arc<dyn ContentLoader> {
        &self.loader
    }

    pub fn controller(&self) -> &Arc<dyn ContentController> {
        &self.controller
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("pattern", &self.pattern.as_str())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A path claimed by a registration.
#[derive(Debug)]
pub struct RegistryMatch<'a> {
    pub registration: &'a Registration,
    pub source: SourceFile,
}

#[derive(Debug, Default)]
pub struct ContentRegistry {
    registrations: Vec<Registration>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration. Earlier registrations take priority.
    pub fn register(
        &mut self,
        pattern: &str,
        kind: &str,
        loader: Arc<dyn ContentLoader>,
        controller: Arc<dyn ContentController>,
    ) -> Result<(), regex::Error> {
        self.registrations.push(Registration {
            pattern: Regex::new(pattern)?,
            kind: kind.to_string(),
            loader,
            controller,
        });
        Ok(())
    }

    /// First registration whose pattern matches `path`.
    pub fn match_path(&self, path: &str) -> Option<RegistryMatch<'_>> {
        self.registrations.iter().find_map(|registration| {
            let caps = registration.pattern.captures(path)?;
            let captures = caps
                .iter()
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect();
            Some(RegistryMatch {
                registration,
                source: SourceFile {
                    path: path.to_string(),
                    kind: registration.kind.clone(),
                    captures,
                },
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
