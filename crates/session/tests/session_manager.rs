//! Single-context behaviour of the session manager.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Duration as ChronoDuration;
use common::{grant, isolated, login_grant, store, Reply, ScriptedTransport, TIMEOUT};
use storefront_core::{keys, Clock, ManualClock, SessionError, SessionStatus};
use storefront_events::{ChangeNotification, EventHub, NotificationKind};
use storefront_session::{transport, LoginRequest, TransportError};
use storefront_store::{FileStore, KeyValueStore};

fn login(remember_user: bool) -> LoginRequest {
    LoginRequest {
        email: "shopper@example.com".to_string(),
        password: "hunter2".to_string(),
        remember_user,
    }
}

/// Record every notification of `kind` this hub delivers.
fn recorder(hub: &EventHub, kind: NotificationKind) -> Arc<Mutex<Vec<ChangeNotification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hub.on(kind, move |event| sink.lock().unwrap().push(event.notification.clone()));
    seen
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_context_is_anonymous() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);

    assert_eq!(ctx.manager.status(), SessionStatus::Anonymous);
    assert!(ctx.manager.token().is_none());
    assert!(ctx.manager.cart_id().is_none());
}

#[tokio::test]
async fn login_persists_every_auth_key_and_announces() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    let auth_events = recorder(&ctx.hub, NotificationKind::AuthChanged);
    login_grant(&ctx.transport, "acc-1", Some("ref-1"));

    let status = ctx.manager.login(login(false), TIMEOUT).await.expect("login should succeed");

    assert_eq!(status, SessionStatus::Authenticated);
    assert_eq!(ctx.manager.user_id().as_deref(), Some("42"));
    for key in keys::AUTH_KEYS {
        assert!(store.get(key).unwrap().is_some(), "{key} should be stored");
    }
    assert_eq!(store.get(keys::USER_AUTH).unwrap().as_deref(), Some("acc-1"));
    assert_eq!(store.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("ref-1"));
    assert_eq!(
        *auth_events.lock().unwrap(),
        vec![ChangeNotification::auth(Some("42".to_string()), SessionStatus::Authenticated)]
    );
    assert_eq!(ctx.transport.documents(), vec![transport::LOGIN_MUTATION.to_string()]);
}

#[tokio::test]
async fn remember_me_keeps_auth_keys_for_seven_days() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    login_grant(&ctx.transport, "acc", Some("ref"));

    ctx.manager.login(login(true), TIMEOUT).await.expect("login should succeed");

    for key in keys::AUTH_KEYS {
        assert_eq!(store.ttl(key).unwrap(), Some(ChronoDuration::seconds(604_800)), "{key}");
    }
}

#[tokio::test]
async fn without_remember_me_auth_keys_last_thirty_minutes() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    login_grant(&ctx.transport, "acc", Some("ref"));

    ctx.manager.login(login(false), TIMEOUT).await.expect("login should succeed");

    for key in keys::AUTH_KEYS {
        assert_eq!(store.ttl(key).unwrap(), Some(ChronoDuration::seconds(1800)), "{key}");
    }

    // Once the keys lapse a reload finds nothing, whatever the token said.
    clock.advance(ChronoDuration::seconds(1800));
    ctx.manager.reload();
    assert_eq!(ctx.manager.status(), SessionStatus::Anonymous);
}

#[tokio::test]
async fn rejected_login_changes_nothing() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    let auth_events = recorder(&ctx.hub, NotificationKind::AuthChanged);
    ctx.transport.push_errors("The account sign-in was incorrect");

    let result = ctx.manager.login(login(false), TIMEOUT).await;

    assert_matches!(result, Err(SessionError::Rejected(msg)) if msg.contains("incorrect"));
    assert_eq!(ctx.manager.status(), SessionStatus::Anonymous);
    assert!(store.keys().unwrap().is_empty());
    assert!(auth_events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn grant_without_customer_id_is_unexpected() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    ctx.transport.push_data(
        "generateCustomerToken",
        serde_json::json!({ "token": "acc", "refreshToken": null, "expiresIn": 3600 }),
    );

    let result = ctx.manager.login(login(false), TIMEOUT).await;

    assert_matches!(result, Err(SessionError::UnexpectedResponse(_)));
    assert_eq!(ctx.manager.status(), SessionStatus::Anonymous);
}

#[tokio::test(start_paused = true)]
async fn stalled_login_times_out_without_state_change() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    let auth_events = recorder(&ctx.hub, NotificationKind::AuthChanged);
    ctx.transport.push(Reply::Stall);

    let result = ctx.manager.login(login(true), Duration::from_secs(2)).await;

    assert_matches!(result, Err(SessionError::TransientNetwork(_)));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(ctx.manager.status(), SessionStatus::Anonymous);
    assert!(store.keys().unwrap().is_empty());
    assert!(auth_events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transport_failure_is_transient() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    ctx.transport.push(Reply::Fail(TransportError("connection refused".to_string())));

    let result = ctx.manager.login(login(false), TIMEOUT).await;
    assert_matches!(result, Err(SessionError::TransientNetwork(msg)) if msg.contains("refused"));
}

// ---------------------------------------------------------------------------
// Expiry and refresh
// ---------------------------------------------------------------------------

/// Log in with a ten minute token and the short auth TTL.
async fn short_session(ctx: &common::Context, refresh: Option<&str>) {
    ctx.transport
        .push_data("generateCustomerToken", grant("acc-1", refresh, 600, "42"));
    ctx.manager.login(login(false), TIMEOUT).await.expect("login should succeed");
}

#[tokio::test]
async fn status_follows_the_clock() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    short_session(&ctx, Some("ref-1")).await;

    clock.advance(ChronoDuration::seconds(539));
    assert_eq!(ctx.manager.status(), SessionStatus::Authenticated);

    clock.advance(ChronoDuration::seconds(1));
    assert_eq!(ctx.manager.status(), SessionStatus::Expiring);

    clock.advance(ChronoDuration::seconds(60));
    assert_eq!(ctx.manager.status(), SessionStatus::Expired);
}

#[tokio::test]
async fn refresh_replaces_the_token() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    short_session(&ctx, Some("ref-1")).await;
    clock.advance(ChronoDuration::seconds(570));
    ctx.transport
        .push_data("refreshCustomerToken", grant("acc-2", Some("ref-2"), 600, "42"));

    let status = ctx.manager.refresh(TIMEOUT).await.expect("refresh should succeed");

    assert_eq!(status, SessionStatus::Authenticated);
    let token = ctx.manager.token().expect("token held");
    assert_eq!(token.access_token, "acc-2");
    assert_eq!(token.refresh_token.as_deref(), Some("ref-2"));
    assert_eq!(token.issued_at, clock.now());
    assert!(!token.remember_user);
    assert_eq!(store.get(keys::USER_AUTH).unwrap().as_deref(), Some("acc-2"));
    assert_eq!(store.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("ref-2"));
}

#[tokio::test]
async fn refresh_keeps_old_refresh_token_when_none_returned() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    short_session(&ctx, Some("ref-1")).await;
    clock.advance(ChronoDuration::seconds(600));
    ctx.transport
        .push_data("refreshCustomerToken", grant("acc-2", None, 600, "42"));

    ctx.manager.refresh(TIMEOUT).await.expect("refresh should succeed");

    assert_eq!(store.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("ref-1"));
}

#[tokio::test]
async fn refresh_without_refresh_token_makes_no_request() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    short_session(&ctx, None).await;
    clock.advance(ChronoDuration::seconds(570));

    let result = ctx.manager.refresh(TIMEOUT).await;

    assert_matches!(result, Err(SessionError::InvalidState(_)));
    // Only the login call went out.
    assert_eq!(ctx.transport.calls(), 1);
}

#[tokio::test]
async fn refresh_while_anonymous_is_invalid() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);

    let result = ctx.manager.refresh(TIMEOUT).await;

    assert_matches!(result, Err(SessionError::InvalidState(_)));
    assert_eq!(ctx.transport.calls(), 0);
}

#[tokio::test]
async fn refresh_of_a_fresh_token_is_a_no_op() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    short_session(&ctx, Some("ref-1")).await;

    let status = ctx.manager.refresh(TIMEOUT).await.expect("nothing to do");

    assert_eq!(status, SessionStatus::Authenticated);
    assert_eq!(ctx.transport.calls(), 1);
}

#[tokio::test]
async fn failed_refresh_expires_the_session_but_keeps_identity() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    short_session(&ctx, Some("ref-1")).await;
    clock.advance(ChronoDuration::seconds(570));
    let auth_events = recorder(&ctx.hub, NotificationKind::AuthChanged);
    ctx.transport.push_errors("refresh token revoked");

    let result = ctx.manager.refresh(TIMEOUT).await;

    assert_matches!(result, Err(SessionError::Rejected(_)));
    assert_eq!(ctx.manager.status(), SessionStatus::Expired);
    assert_eq!(ctx.manager.user_id().as_deref(), Some("42"));
    assert_eq!(ctx.manager.token().map(|t| t.access_token).as_deref(), Some("acc-1"));
    assert_eq!(store.get(keys::USER_AUTH).unwrap().as_deref(), Some("acc-1"));
    assert_eq!(
        *auth_events.lock().unwrap(),
        vec![ChangeNotification::auth(Some("42".to_string()), SessionStatus::Expired)]
    );
}

#[tokio::test]
async fn login_after_failed_refresh_recovers() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    short_session(&ctx, Some("ref-1")).await;
    clock.advance(ChronoDuration::seconds(570));
    ctx.transport.push_errors("refresh token revoked");
    let _ = ctx.manager.refresh(TIMEOUT).await;

    login_grant(&ctx.transport, "acc-3", Some("ref-3"));
    let status = ctx.manager.login(login(false), TIMEOUT).await.expect("login should succeed");

    assert_eq!(status, SessionStatus::Authenticated);
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_clears_auth_but_keeps_cart() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    login_grant(&ctx.transport, "acc", Some("ref"));
    ctx.manager.login(login(false), TIMEOUT).await.expect("login should succeed");
    ctx.manager.set_cart_id("cart-1");
    let auth_events = recorder(&ctx.hub, NotificationKind::AuthChanged);
    let cart_events = recorder(&ctx.hub, NotificationKind::CartChanged);

    ctx.manager.logout();

    assert_eq!(ctx.manager.status(), SessionStatus::Anonymous);
    assert!(ctx.manager.token().is_none());
    assert!(ctx.manager.user_id().is_none());
    for key in keys::AUTH_KEYS {
        assert!(store.get(key).unwrap().is_none(), "{key} should be gone");
    }
    assert_eq!(store.get(keys::CART_ID).unwrap().as_deref(), Some("cart-1"));
    assert_eq!(ctx.manager.cart_id().as_deref(), Some("cart-1"));
    assert_eq!(
        *auth_events.lock().unwrap(),
        vec![ChangeNotification::auth(None, SessionStatus::Anonymous)]
    );
    assert!(cart_events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn logout_when_anonymous_is_silent() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    let auth_events = recorder(&ctx.hub, NotificationKind::AuthChanged);

    ctx.manager.logout();

    assert!(auth_events.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ensure_cart_creates_once() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    let cart_events = recorder(&ctx.hub, NotificationKind::CartChanged);
    ctx.transport.push_data("createEmptyCart", serde_json::json!("cart-9"));

    let first = ctx.manager.ensure_cart(TIMEOUT).await.expect("cart should be created");
    let second = ctx.manager.ensure_cart(TIMEOUT).await.expect("cart should be reused");

    assert_eq!(first, "cart-9");
    assert_eq!(second, "cart-9");
    assert_eq!(ctx.transport.calls(), 1);
    assert_eq!(store.ttl(keys::CART_ID).unwrap(), Some(ChronoDuration::seconds(604_800)));
    assert_eq!(
        *cart_events.lock().unwrap(),
        vec![ChangeNotification::cart(Some("cart-9".to_string()))]
    );
}

#[tokio::test]
async fn failed_cart_creation_stores_nothing() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    ctx.transport.push(Reply::Fail(TransportError("offline".to_string())));

    let result = ctx.manager.ensure_cart(TIMEOUT).await;

    assert_matches!(result, Err(SessionError::TransientNetwork(_)));
    assert!(store.get(keys::CART_ID).unwrap().is_none());
}

#[tokio::test]
async fn clear_cart_removes_and_announces() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let ctx = isolated(&store, &clock);
    ctx.manager.set_cart_id("cart-1");
    let cart_events = recorder(&ctx.hub, NotificationKind::CartChanged);

    ctx.manager.clear_cart();

    assert!(ctx.manager.cart_id().is_none());
    assert!(store.get(keys::CART_ID).unwrap().is_none());
    assert_eq!(*cart_events.lock().unwrap(), vec![ChangeNotification::cart(None)]);
}

#[tokio::test]
async fn existing_session_is_loaded_at_startup() {
    let clock = ManualClock::default();
    let store = store(&clock);
    let first = isolated(&store, &clock);
    login_grant(&first.transport, "acc", Some("ref"));
    first.manager.login(login(true), TIMEOUT).await.expect("login should succeed");
    first.manager.set_cart_id("cart-1");

    let second = isolated(&store, &clock);

    assert_eq!(second.manager.status(), SessionStatus::Authenticated);
    assert_eq!(second.manager.record(), first.manager.record());
}

#[tokio::test]
async fn dropping_the_manager_unregisters_its_listeners() {
    let clock = ManualClock::default();
    let ctx = isolated(&store(&clock), &clock);
    assert_eq!(ctx.hub.listener_count(NotificationKind::AuthChanged), 1);
    assert_eq!(ctx.hub.listener_count(NotificationKind::CartChanged), 1);

    let hub = ctx.hub.clone();
    drop(ctx);

    assert_eq!(hub.listener_count(NotificationKind::AuthChanged), 0);
    assert_eq!(hub.listener_count(NotificationKind::CartChanged), 0);
}

// ---------------------------------------------------------------------------
// Storage degradation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unusable_storage_degrades_to_memory_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");
    let clock = ManualClock::default();
    let broken = Arc::new(FileStore::new(
        blocker.join("session.json"),
        common::DOMAIN,
        Arc::new(clock.clone()),
    ));
    let transport = ScriptedTransport::new();
    let manager = storefront_session::SessionManager::new(
        broken,
        EventHub::new(Arc::new(storefront_events::NoopBus)),
        transport.clone(),
        Arc::new(clock.clone()),
        storefront_core::SessionConfig::default(),
    );
    assert_eq!(manager.status(), SessionStatus::Anonymous);
    login_grant(&transport, "acc", Some("ref"));

    let status = manager.login(login(false), TIMEOUT).await.expect("login should succeed");

    // Nothing reached disk but this context still holds the session.
    assert_eq!(status, SessionStatus::Authenticated);
    assert_eq!(manager.user_id().as_deref(), Some("42"));
}
