//! In-memory cache of legacy path -> canonical path redirects.
//!
//! The cache only accelerates lookups. A miss never fetches anything by
//! itself; the caller asks the authoritative source (see
//! [`RedirectResolver`](crate::resolver::RedirectResolver)) and `put`s the
//! answer back. Entries expire lazily on read, like the key/value store,
//! and nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use storefront_core::{Clock, Timestamp};

/// One cached redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectEntry {
    /// Normalized source path.
    pub source_path: String,
    pub target_path: String,
    pub inserted_at: Timestamp,
}

/// Canonical form used as the cache key: no query or fragment, lowercase,
/// leading slash, no empty segments (so `//` collapses and there is no
/// trailing slash except for the root).
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/").to_lowercase())
}

pub struct RedirectCache {
    entries: Mutex<HashMap<String, RedirectEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RedirectCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RedirectEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Target for `path`, if a live entry exists. A stale entry is removed.
    pub fn lookup(&self, path: &str) -> Option<String> {
        let key = normalize_path(path);
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(&key) {
            Some(entry) if now < entry.inserted_at + self.ttl => Some(entry.target_path.clone()),
            Some(_) => {
                entries.remove(&key);
                tracing::trace!(path = %key, "Redirect entry expired");
                None
            }
            None => None,
        }
    }

    pub fn put(&self, source_path: &str, target_path: &str) {
        let source_path = normalize_path(source_path);
        let entry = RedirectEntry {
            source_path: source_path.clone(),
            target_path: target_path.to_string(),
            inserted_at: self.clock.now(),
        };
        self.entries().insert(source_path, entry);
    }

    /// Bulk load, e.g. at startup. Every entry starts a fresh TTL.
    pub fn seed<I, S, T>(&self, entries: I)
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let now = self.clock.now();
        let mut map = self.entries();
        let before = map.len();
        for (source, target) in entries {
            let source_path = normalize_path(source.as_ref());
            map.insert(
                source_path.clone(),
                RedirectEntry {
                    source_path,
                    target_path: target.as_ref().to_string(),
                    inserted_at: now,
                },
            );
        }
        tracing::debug!(
            added = map.len().saturating_sub(before),
            total = map.len(),
            "Redirect cache seeded"
        );
    }

    /// Number of held entries, including ones not yet found stale.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
