//! Entry table shared by the backends.
//!
//! A backend owns the medium (a locked map, a file); [`EntryTable`] owns the
//! domain scoping and lazy-expiry rules so both backends behave identically.

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use storefront_core::Timestamp;

use crate::StoreOp;

/// One stored value and its absolute deadline on the local clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: String,
    pub expires_at: Option<Timestamp>,
}

impl StoredEntry {
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Key of `key` inside `domain` on the shared medium.
pub fn scoped_key(domain: &str, key: &str) -> String {
    format!("{domain}|{key}")
}

/// All entries on one medium, across every domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryTable {
    entries: HashMap<String, StoredEntry>,
}

impl EntryTable {
    pub fn set(
        &mut self,
        domain: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        now: Timestamp,
    ) {
        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        self.entries.insert(scoped_key(domain, key), entry);
    }

    /// Returns the live value and whether an expired entry was dropped.
    pub fn get(&mut self, domain: &str, key: &str, now: Timestamp) -> (Option<String>, bool) {
        let scoped = scoped_key(domain, key);
        match self.entries.get(&scoped) {
            Some(entry) if entry.is_live(now) => (Some(entry.value.clone()), false),
            Some(_) => {
                self.entries.remove(&scoped);
                (None, true)
            }
            None => (None, false),
        }
    }

    /// Returns whether anything was removed.
    pub fn delete(&mut self, domain: &str, key: &str) -> bool {
        self.entries.remove(&scoped_key(domain, key)).is_some()
    }

    /// Returns the live keys of `domain` and whether expired entries were dropped.
    pub fn keys(&mut self, domain: &str, now: Timestamp) -> (Vec<String>, bool) {
        let prefix = scoped_key(domain, "");
        let before = self.entries.len();
        self.entries
            .retain(|scoped, entry| !scoped.starts_with(&prefix) || entry.is_live(now));
        let pruned = self.entries.len() != before;

        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter_map(|scoped| scoped.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        keys.sort();
        (keys, pruned)
    }

    /// Apply `ops` in order. Returns whether anything changed.
    pub fn apply(&mut self, domain: &str, ops: &[StoreOp<'_>], now: Timestamp) -> bool {
        let mut changed = false;
        for op in ops {
            match *op {
                StoreOp::Set { key, value, ttl } => {
                    self.set(domain, key, value, ttl, now);
                    changed = true;
                }
                StoreOp::Delete { key } => changed |= self.delete(domain, key),
            }
        }
        changed
    }

    /// Live values of `keys`, in order, and whether expired entries were dropped.
    pub fn get_many(
        &mut self,
        domain: &str,
        keys: &[&str],
        now: Timestamp,
    ) -> (Vec<Option<String>>, bool) {
        let mut pruned = false;
        let values = keys
            .iter()
            .map(|key| {
                let (value, expired) = self.get(domain, key, now);
                pruned |= expired;
                value
            })
            .collect();
        (values, pruned)
    }

    pub fn ttl(&self, domain: &str, key: &str, now: Timestamp) -> Option<Duration> {
        let entry = self.entries.get(&scoped_key(domain, key))?;
        if !entry.is_live(now) {
            return None;
        }
        entry.expires_at.map(|deadline| deadline - now)
    }
}
