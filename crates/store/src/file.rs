//! JSON-file backend.
//!
//! Every call takes an exclusive advisory lock on a sidecar `<path>.lock`,
//! reads the whole file, applies its change and writes it back through a
//! uniquely named temporary file and rename. Handles in this or any other
//! process therefore never lose each other's keys and never observe a
//! half-written file.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use fs2::FileExt;
use storefront_core::Clock;
use tempfile::NamedTempFile;

use crate::entry::EntryTable;
use crate::{KeyValueStore, StoreError, StoreOp};

pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    domain: String,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Open (lazily) the store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>, domain: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: lock_path.into(),
            domain: domain.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Exclusive lock held until the returned file is dropped.
    fn lock(&self) -> Result<File, StoreError> {
        fs::create_dir_all(self.parent())?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn load(&self) -> Result<EntryTable, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(EntryTable::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(EntryTable::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, table: &EntryTable) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(table)?;
        let mut tmp = NamedTempFile::new_in(self.parent())?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Run `f` on the table under the lock; save when it reports a change.
    fn with_table<T>(
        &self,
        f: impl FnOnce(&mut EntryTable) -> (T, bool),
    ) -> Result<T, StoreError> {
        let _lock = self.lock()?;
        let mut table = self.load()?;
        let (out, dirty) = f(&mut table);
        if dirty {
            self.save(&table)?;
        }
        Ok(out)
    }
}

impl KeyValueStore for FileStore {
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.with_table(|table| {
            table.set(&self.domain, key, value, ttl, now);
            ((), true)
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        self.with_table(|table| table.get(&self.domain, key, now))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_table(|table| ((), table.delete(&self.domain, key)))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        self.with_table(|table| table.keys(&self.domain, now))
    }

    fn apply(&self, ops: &[StoreOp<'_>]) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.with_table(|table| ((), table.apply(&self.domain, ops, now)))
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let now = self.clock.now();
        self.with_table(|table| table.get_many(&self.domain, keys, now))
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        self.with_table(|table| (table.ttl(&self.domain, key, now), false))
    }
}
