use std::fmt;

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identity of one execution context (one tab, one process).
///
/// Carried on every broadcast envelope so a context can recognise and drop
/// its own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(uuid::Uuid);

impl ContextId {
    /// Allocate a fresh random context id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authentication state of one execution context.
///
/// Computed from the held token and the clock; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
    /// Token present and inside the refresh window.
    Expiring,
    /// Token present but past its lifetime, or its refresh failed.
    Expired,
}

impl SessionStatus {
    pub fn is_signed_in(self) -> bool {
        matches!(self, Self::Authenticated | Self::Expiring)
    }
}
