use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use storefront_core::Clock;

use crate::entry::EntryTable;
use crate::{KeyValueStore, StoreError, StoreOp};

/// In-memory backend.
///
/// Clones share one underlying map, so handing a clone to each simulated
/// execution context gives them a common storage medium exactly like
/// sibling tabs sharing a cookie jar.
#[derive(Clone)]
pub struct MemoryStore {
    table: Arc<Mutex<EntryTable>>,
    domain: String,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(domain: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(Mutex::new(EntryTable::default())),
            domain: domain.into(),
            clock,
        }
    }

    /// A handle onto the same medium scoped to a different domain.
    pub fn for_domain(&self, domain: impl Into<String>) -> Self {
        Self {
            table: Arc::clone(&self.table),
            domain: domain.into(),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn lock(&self) -> Result<MutexGuard<'_, EntryTable>, StoreError> {
        self.table.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.lock()?.set(&self.domain, key, value, ttl, now);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let (value, expired) = self.lock()?.get(&self.domain, key, now);
        if expired {
            tracing::trace!(domain = %self.domain, key, "Dropped expired entry");
        }
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.delete(&self.domain, key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        Ok(self.lock()?.keys(&self.domain, now).0)
    }

    fn apply(&self, ops: &[StoreOp<'_>]) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.lock()?.apply(&self.domain, ops, now);
        Ok(())
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let now = self.clock.now();
        Ok(self.lock()?.get_many(&self.domain, keys, now).0)
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        Ok(self.lock()?.ttl(&self.domain, key, now))
    }
}
