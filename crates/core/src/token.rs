//! Access/refresh token pair with expiry derived on every read.
//!
//! Only `issued_at` and `expires_in` are ever persisted. The absolute expiry
//! is recomputed from them each time it is asked for, so no device ever
//! stores a wall-clock deadline minted by another device's clock.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// An authentication token as held by one execution context.
///
/// Immutable once built: refresh replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: Timestamp,
    /// Lifetime in seconds from `issued_at`.
    pub expires_in: i64,
    pub remember_user: bool,
}

impl SessionToken {
    /// `issued_at + expires_in`.
    pub fn expires_at(&self) -> Timestamp {
        self.issued_at + Duration::seconds(self.expires_in)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at()
    }

    /// True once `now` is inside `window` of the expiry (or past it).
    pub fn expires_soon(&self, now: Timestamp, window: Duration) -> bool {
        now >= self.expires_at() - window
    }

    /// The timing half of the token, as persisted under `auth-issued`.
    pub fn timing(&self) -> TokenTiming {
        TokenTiming {
            issued_at: self.issued_at,
            expires_in: self.expires_in,
            remember_user: self.remember_user,
        }
    }
}

/// Persisted token metadata. Never carries an absolute expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTiming {
    pub issued_at: Timestamp,
    pub expires_in: i64,
    #[serde(default)]
    pub remember_user: bool,
}
