//! Domain-scoped key/value storage with per-key expiry.
//!
//! This crate provides the persistent half of cross-context session state:
//!
//! - [`KeyValueStore`]: the capability every backend implements.
//! - [`MemoryStore`]: a map shared by every handle cloned from it; models
//!   several execution contexts inside one process.
//! - [`FileStore`]: a JSON file on disk; models contexts that are separate
//!   processes sharing one file.
//!
//! Expiry is lazy: there is no sweep task. An entry past its deadline is
//! dropped the next time it is read or enumerated.

pub mod entry;
pub mod file;
pub mod memory;

use chrono::Duration;
use storefront_core::SessionError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage medium could not be read or written.
    #[error("Storage medium unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The storage medium holds data that does not parse.
    #[error("Storage contents corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Another handle panicked while holding the shared map.
    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::StorageUnavailable(err.to_string())
    }
}

/// One write inside a [`KeyValueStore::apply`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp<'a> {
    Set {
        key: &'a str,
        value: &'a str,
        ttl: Option<Duration>,
    },
    Delete {
        key: &'a str,
    },
}

/// Capability shared by all backends.
///
/// Calls are synchronous. Several handles may point at the same medium; the
/// last writer wins and there is no cross-handle locking beyond what a
/// single call needs.
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl` if given.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Read `key`. An expired entry reads as absent and is deleted.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Live keys of this store's domain.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Apply every op as one write. A reader on any handle sees either none
    /// of the batch or all of it.
    fn apply(&self, ops: &[StoreOp<'_>]) -> Result<(), StoreError>;

    /// Read several keys from one snapshot of the medium.
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError>;

    /// Remaining lifetime of `key`.
    ///
    /// `None` when the key is absent or was stored without a TTL.
    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}
