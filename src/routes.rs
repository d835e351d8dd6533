//! Route table: URL pattern → content path.
//!
//! Patterns are regexes supplied by controllers. Each is compiled anchored at
//! both ends and kept in insertion order; the first pattern matching a
//! request wins. The table only holds the content path of the owning item,
//! never the item itself.

use regex::Regex;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};

/// Capture groups of a matched route.
///
/// Index 0 is the whole request path. Groups that did not participate in the
/// match are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteCaptures {
    groups: Vec<Option<String>>,
    names: Vec<Option<String>>,
}

impl RouteCaptures {
    fn from_match(regex: &Regex, caps: &regex::Captures<'_>) -> Self {
        Self {
            groups: caps
                .iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect(),
            names: regex.capture_names().map(|n| n.map(String::from)).collect(),
        }
    }

    /// The full matched request path.
    pub fn whole(&self) -> &str {
        self.get(0).unwrap_or("")
    }

    /// Positional group; `get(1)` is the first parenthesised group.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Named group (`(?P<slug>...)`).
    pub fn name(&self, name: &str) -> Option<&str> {
        let index = self
            .names
            .iter()
            .position(|n| n.as_deref() == Some(name))?;
        self.get(index)
    }

    /// Number of groups, including the whole match.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Positional groups after the whole match, unmatched ones as `None`.
    pub fn groups(&self) -> impl Iterator<Item = Option<&str>> {
        self.groups.iter().skip(1).map(|g| g.as_deref())
    }
}

/// A compiled route.
#[derive(Debug, Clone)]
struct RouteEntry {
    pattern: String,
    regex: Regex,
    target: String,
}

/// Serializable view of one route, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub pattern: String,
    pub target: String,
}

/// A resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub target: String,
    pub captures: RouteCaptures,
}

/// Insertion-ordered routes guarded by one lock.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: RwLock<Vec<RouteEntry>>,
}

/// Compile a route pattern anchored at both ends.
pub fn compile_route(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every route targeting `target` with `patterns`.
    ///
    /// Stale routes are pruned before the new ones are added. A pattern
    /// already owned by another path is taken over (collisions are a
    /// controller bug and are only logged). Patterns that fail to compile
    /// are skipped and returned.
    pub fn replace_target(
        &self,
        target: &str,
        patterns: &[String],
    ) -> Vec<(String, regex::Error)> {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut failures = Vec::new();
        for pattern in patterns {
            match compile_route(pattern) {
                Ok(regex) => compiled.push((pattern.clone(), regex)),
                Err(e) => failures.push((pattern.clone(), e)),
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| e.target != target);
        for (pattern, regex) in compiled {
            if let Some(existing) = entries.iter_mut().find(|e| e.pattern == pattern) {
                log::warn!(
                    "route {} claimed by both {} and {}; {} wins",
                    pattern,
                    existing.target,
                    target,
                    target
                );
                existing.target = target.to_string();
                existing.regex = regex;
            } else {
                entries.push(RouteEntry {
                    pattern,
                    regex,
                    target: target.to_string(),
                });
            }
        }
        failures
    }

    /// Remove every route pointing at `target`. Returns how many were removed.
    pub fn remove_target(&self, target: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.target != target);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// First route (insertion order) whose pattern matches the whole of `path`.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().find_map(|entry| {
            entry.regex.captures(path).map(|caps| RouteMatch {
                target: entry.target.clone(),
                captures: RouteCaptures::from_match(&entry.regex, &caps),
            })
        })
    }

    /// Patterns currently pointing at `target`, in table order.
    pub fn patterns_for(&self, target: &str) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|e| e.target == target)
            .map(|e| e.pattern.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<RouteInfo> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|e| RouteInfo {
                pattern: e.pattern.clone(),
                target: e.target.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
