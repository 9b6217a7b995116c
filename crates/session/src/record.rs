//! Mapping between [`SessionRecord`] and the discrete persisted keys.
//!
//! The record is never stored as one blob. Each field has its own key and
//! TTL, and the token is always written as a whole (every auth key, every
//! time) so a lost update between two contexts can never leave a new access
//! token paired with an old refresh token.

use chrono::{DateTime, Duration, Utc};
use storefront_core::keys;
use storefront_core::token::TokenTiming;
use storefront_core::SessionToken;
use storefront_store::{KeyValueStore, StoreError, StoreOp};

/// Everything one execution context knows about its session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: Option<String>,
    pub customer_type: Option<String>,
    pub cart_id: Option<String>,
    pub token: Option<SessionToken>,
}

/// Auth half of a record, as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AuthFields {
    pub user_id: Option<String>,
    pub customer_type: Option<String>,
    pub token: Option<SessionToken>,
}

pub(crate) fn load_auth(store: &dyn KeyValueStore) -> Result<AuthFields, StoreError> {
    let [user_id, access_token, customer_type, refresh_token, timing]: [Option<String>; 5] = store
        .get_many(&[
            keys::USER,
            keys::USER_AUTH,
            keys::USER_TYPE,
            keys::REFRESH_TOKEN,
            keys::AUTH_ISSUED,
        ])?
        .try_into()
        .map_err(|_| StoreError::Unavailable(std::io::Error::other("short batch read")))?;

    let token = match (&user_id, access_token) {
        (Some(_), Some(access_token)) => {
            let timing = parse_timing(timing.as_deref());
            Some(SessionToken {
                access_token,
                refresh_token,
                issued_at: timing.issued_at,
                expires_in: timing.expires_in,
                remember_user: timing.remember_user,
            })
        }
        (None, Some(_)) => {
            tracing::warn!("Access token stored without a user id, treating session as anonymous");
            None
        }
        _ => None,
    };

    Ok(AuthFields {
        user_id,
        customer_type,
        token,
    })
}

/// Timing of the stored token. Missing or unreadable timing yields a token
/// that is already expired, so it is never trusted as fresh.
fn parse_timing(raw: Option<&str>) -> TokenTiming {
    let stale = TokenTiming {
        issued_at: DateTime::<Utc>::UNIX_EPOCH,
        expires_in: 0,
        remember_user: false,
    };
    let Some(raw) = raw else {
        return stale;
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Unreadable token timing, treating token as expired");
        stale
    })
}

pub(crate) fn load_cart(store: &dyn KeyValueStore) -> Result<Option<String>, StoreError> {
    store.get(keys::CART_ID)
}

/// Write every auth key in one batch, so a reader in another context sees
/// either the old token or the new one and never a mix.
pub(crate) fn save_auth(
    store: &dyn KeyValueStore,
    user_id: &str,
    customer_type: Option<&str>,
    token: &SessionToken,
    ttl: Duration,
) -> Result<(), StoreError> {
    let timing = serde_json::to_string(&token.timing())?;
    let ttl = Some(ttl);
    let set = |key, value| StoreOp::Set { key, value, ttl };
    store.apply(&[
        set(keys::AUTH_ISSUED, timing.as_str()),
        match token.refresh_token.as_deref() {
            Some(refresh) => set(keys::REFRESH_TOKEN, refresh),
            None => StoreOp::Delete { key: keys::REFRESH_TOKEN },
        },
        match customer_type {
            Some(kind) => set(keys::USER_TYPE, kind),
            None => StoreOp::Delete { key: keys::USER_TYPE },
        },
        set(keys::USER, user_id),
        set(keys::USER_AUTH, token.access_token.as_str()),
    ])
}

/// Delete every auth key in one batch. Returns whether any of them was
/// present.
pub(crate) fn clear_auth(store: &dyn KeyValueStore) -> Result<bool, StoreError> {
    let held = store.get_many(&keys::AUTH_KEYS)?.iter().any(Option::is_some);
    let ops = keys::AUTH_KEYS.map(|key| StoreOp::Delete { key });
    store.apply(&ops)?;
    Ok(held)
}

pub(crate) fn save_cart(
    store: &dyn KeyValueStore,
    cart_id: &str,
    ttl: Duration,
) -> Result<(), StoreError> {
    store.set(keys::CART_ID, cart_id, Some(ttl))
}

pub(crate) fn clear_cart(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.delete(keys::CART_ID)
}
