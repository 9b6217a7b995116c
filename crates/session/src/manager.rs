//! Session state for one execution context.
//!
//! [`SessionManager`] owns the authentication token and cart identity of one
//! context. It writes them to the shared [`KeyValueStore`], announces every
//! change through the [`EventHub`], and re-reads the store whenever a
//! sibling context announces a change. The store is the source of truth;
//! notification payloads are only triggers.
//!
//! State machine (see [`SessionStatus`]):
//!
//! ```text
//! anonymous --login ok--> authenticated --time--> expiring --refresh ok--> authenticated
//! expiring|expired --refresh failed--> expired (token kept)
//! any signed-in state --logout--> anonymous
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use storefront_core::{Clock, SessionConfig, SessionError, SessionStatus, SessionToken};
use storefront_events::{ChangeNotification, EventHub, NotificationKind, Origin, Subscription};
use storefront_store::{KeyValueStore, StoreError};

use crate::record::{self, SessionRecord};
use crate::transport::{self, QueryTransport};

/// Credentials for [`SessionManager::login`].
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Keep the auth keys for the remember-me duration instead of 30 minutes.
    pub remember_user: bool,
}

/// Token grant returned by login and refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenGrant {
    token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    customer_id: Option<String>,
    customer_type: Option<String>,
}

/// In-memory view of the persisted record.
#[derive(Debug, Default)]
struct LocalView {
    record: SessionRecord,
    /// Access token whose refresh failed. While it is still the current
    /// token the session reads as expired.
    failed_refresh: Option<String>,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    hub: EventHub,
    transport: Arc<dyn QueryTransport>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    view: Mutex<LocalView>,
    subscriptions: [Subscription; 2],
}

/// Session state manager. Cloning yields another handle on the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Build a manager, load the persisted session, and start following
    /// notifications from sibling contexts.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        hub: EventHub,
        transport: Arc<dyn QueryTransport>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let auth_weak = weak.clone();
            let on_auth = hub.on(NotificationKind::AuthChanged, move |event| {
                if event.origin == Origin::Remote {
                    if let Some(inner) = auth_weak.upgrade() {
                        inner.reload_auth();
                    }
                }
            });
            let cart_weak = weak.clone();
            let on_cart = hub.on(NotificationKind::CartChanged, move |event| {
                if event.origin == Origin::Remote {
                    if let Some(inner) = cart_weak.upgrade() {
                        inner.reload_cart();
                    }
                }
            });

            Inner {
                store,
                hub,
                transport,
                clock,
                config,
                view: Mutex::new(LocalView::default()),
                subscriptions: [on_auth, on_cart],
            }
        });

        inner.reload_auth();
        inner.reload_cart();
        Self { inner }
    }

    // -- Read side ---------------------------------------------------------

    /// Current state, computed from the held token and the clock.
    pub fn status(&self) -> SessionStatus {
        let view = self.inner.view();
        self.inner.status_of(&view)
    }

    /// Snapshot of the held record.
    pub fn record(&self) -> SessionRecord {
        self.inner.view().record.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.view().record.user_id.clone()
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.inner.view().record.token.clone()
    }

    pub fn cart_id(&self) -> Option<String> {
        self.inner.view().record.cart_id.clone()
    }

    /// Re-read the whole session from the store.
    pub fn reload(&self) {
        self.inner.reload_auth();
        self.inner.reload_cart();
    }

    // -- Authentication ----------------------------------------------------

    /// Sign in. On failure nothing changes and no notification is sent.
    pub async fn login(
        &self,
        request: LoginRequest,
        timeout: Duration,
    ) -> Result<SessionStatus, SessionError> {
        let grant: TokenGrant = transport::execute(
            self.inner.transport.as_ref(),
            transport::LOGIN_MUTATION,
            "generateCustomerToken",
            json!({ "email": request.email, "password": request.password }),
            timeout,
        )
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Login failed"))?;

        let user_id = grant.customer_id.ok_or_else(|| {
            SessionError::UnexpectedResponse("login grant without customerId".to_string())
        })?;
        let token = SessionToken {
            access_token: grant.token,
            refresh_token: grant.refresh_token,
            issued_at: self.inner.clock.now(),
            expires_in: grant.expires_in,
            remember_user: request.remember_user,
        };

        let status = self.inner.commit_auth(user_id, grant.customer_type, token);
        tracing::info!(?status, remember_user = request.remember_user, "Logged in");
        Ok(status)
    }

    /// Exchange the refresh token for a new token pair.
    ///
    /// Without a stored refresh token this fails with
    /// [`SessionError::InvalidState`] before any request is made.
    ///
    /// Re-reads the store first: if a sibling context already refreshed,
    /// the fresh token is adopted and no request is made. A failed refresh
    /// keeps the token (and the user id) but moves the session to
    /// [`SessionStatus::Expired`].
    pub async fn refresh(&self, timeout: Duration) -> Result<SessionStatus, SessionError> {
        self.inner.reload_auth();

        let (current, refresh_token, user_id, customer_type) = {
            let view = self.inner.view();
            let token = view
                .record
                .token
                .clone()
                .ok_or_else(|| SessionError::InvalidState("no session to refresh".to_string()))?;
            let refresh_token = token.refresh_token.clone().ok_or_else(|| {
                SessionError::InvalidState("no refresh token stored".to_string())
            })?;
            if self.inner.status_of(&view) == SessionStatus::Authenticated {
                return Ok(SessionStatus::Authenticated);
            }
            let user_id = view.record.user_id.clone().unwrap_or_default();
            (token, refresh_token, user_id, view.record.customer_type.clone())
        };

        let result: Result<TokenGrant, SessionError> = transport::execute(
            self.inner.transport.as_ref(),
            transport::REFRESH_MUTATION,
            "refreshCustomerToken",
            json!({ "refreshToken": refresh_token }),
            timeout,
        )
        .await;

        let grant = match result {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, session expired");
                self.inner.view().failed_refresh = Some(current.access_token);
                self.inner.announce_auth();
                return Err(e);
            }
        };

        let token = SessionToken {
            access_token: grant.token,
            refresh_token: grant.refresh_token.or(current.refresh_token),
            issued_at: self.inner.clock.now(),
            expires_in: grant.expires_in,
            remember_user: current.remember_user,
        };
        let user_id = grant.customer_id.unwrap_or(user_id);
        let customer_type = grant.customer_type.or(customer_type);

        let status = self.inner.commit_auth(user_id, customer_type, token);
        tracing::debug!(?status, "Token refreshed");
        Ok(status)
    }

    /// Sign out: delete every auth key and forget the token. The cart id
    /// is kept.
    ///
    /// Announces whenever a session existed in this view or in the store,
    /// so siblings follow even when this context had missed the login.
    pub fn logout(&self) {
        let stored = record::clear_auth(self.inner.store.as_ref()).unwrap_or_else(|e| {
            self.inner.storage_degraded("logout", e);
            false
        });

        let was_signed_in = {
            let mut view = self.inner.view();
            let held = view.record.token.is_some() || view.record.user_id.is_some();
            view.record.token = None;
            view.record.user_id = None;
            view.record.customer_type = None;
            view.failed_refresh = None;
            held || stored
        };

        if was_signed_in {
            tracing::info!("Logged out");
            self.inner.announce_auth();
        }
    }

    // -- Cart --------------------------------------------------------------

    /// Return the cart id, creating a cart remotely if none is stored yet.
    pub async fn ensure_cart(&self, timeout: Duration) -> Result<String, SessionError> {
        self.inner.reload_cart();
        if let Some(cart_id) = self.cart_id() {
            return Ok(cart_id);
        }

        let cart_id: String = transport::execute(
            self.inner.transport.as_ref(),
            transport::CREATE_CART_MUTATION,
            "createEmptyCart",
            json!({}),
            timeout,
        )
        .await?;

        self.set_cart_id(&cart_id);
        Ok(cart_id)
    }

    /// Adopt `cart_id` as this session's cart.
    pub fn set_cart_id(&self, cart_id: &str) {
        let ttl = self.inner.config.cart_ttl();
        if let Err(e) = record::save_cart(self.inner.store.as_ref(), cart_id, ttl) {
            self.inner.storage_degraded("set cart", e);
        }
        self.inner.view().record.cart_id = Some(cart_id.to_string());
        self.inner.hub.emit(ChangeNotification::cart(Some(cart_id.to_string())));
    }

    /// Forget the cart.
    pub fn clear_cart(&self) {
        if let Err(e) = record::clear_cart(self.inner.store.as_ref()) {
            self.inner.storage_degraded("clear cart", e);
        }
        self.inner.view().record.cart_id = None;
        self.inner.hub.emit(ChangeNotification::cart(None));
    }
}

impl Inner {
    fn view(&self) -> MutexGuard<'_, LocalView> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn status_of(&self, view: &LocalView) -> SessionStatus {
        let (Some(token), Some(_)) = (&view.record.token, &view.record.user_id) else {
            return SessionStatus::Anonymous;
        };
        let now = self.clock.now();
        if view.failed_refresh.as_deref() == Some(token.access_token.as_str())
            || token.is_expired(now)
        {
            SessionStatus::Expired
        } else if token.expires_soon(now, self.config.soon_window()) {
            SessionStatus::Expiring
        } else {
            SessionStatus::Authenticated
        }
    }

    /// Persist a whole new token, adopt it locally and announce it.
    fn commit_auth(
        &self,
        user_id: String,
        customer_type: Option<String>,
        token: SessionToken,
    ) -> SessionStatus {
        let ttl = self.config.auth_ttl(token.remember_user);
        if let Err(e) = record::save_auth(
            self.store.as_ref(),
            &user_id,
            customer_type.as_deref(),
            &token,
            ttl,
        ) {
            self.storage_degraded("save session", e);
        }

        {
            let mut view = self.view();
            view.record.user_id = Some(user_id);
            view.record.customer_type = customer_type;
            view.record.token = Some(token);
            view.failed_refresh = None;
        }
        self.announce_auth()
    }

    /// Emit `auth-changed` describing the current view.
    fn announce_auth(&self) -> SessionStatus {
        let (user_id, status) = {
            let view = self.view();
            (view.record.user_id.clone(), self.status_of(&view))
        };
        self.hub.emit(ChangeNotification::auth(user_id, status));
        status
    }

    fn reload_auth(&self) {
        let auth = match record::load_auth(self.store.as_ref()) {
            Ok(auth) => auth,
            Err(e) => {
                self.storage_degraded("load session", e);
                Default::default()
            }
        };

        let mut view = self.view();
        view.record.user_id = auth.user_id;
        view.record.customer_type = auth.customer_type;
        view.record.token = auth.token;
        tracing::trace!(status = ?self.status_of(&view), "Session reloaded from store");
    }

    fn reload_cart(&self) {
        let cart_id = record::load_cart(self.store.as_ref()).unwrap_or_else(|e| {
            self.storage_degraded("load cart", e);
            None
        });
        self.view().record.cart_id = cart_id;
    }

    fn storage_degraded(&self, operation: &'static str, error: StoreError) {
        let error = SessionError::from(error);
        tracing::warn!(operation, %error, "Continuing without session storage");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for sub in self.subscriptions {
            self.hub.off(sub.kind(), Some(sub));
        }
    }
}
