//! Smoke harness: two execution contexts sharing one store and one channel.
//!
//! Set `STOREFRONT_SIM_STORE_PATH` to share a JSON file instead of an
//! in-memory map.

mod fake_api;

use std::sync::Arc;
use std::time::Duration;

use storefront_core::{Clock, ContextId, SessionConfig, SessionError, SystemClock};
use storefront_events::{BroadcastChannel, ChannelRegistry, EventHub, NotificationKind, Origin};
use storefront_session::{LoginRequest, RedirectCache, RedirectResolver, SessionManager};
use storefront_store::{FileStore, KeyValueStore, MemoryStore};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fake_api::FakeApi;

/// How long to wait for a sibling context to hear about a change.
const PROPAGATION_WAIT: Duration = Duration::from_secs(2);

struct Tab {
    name: &'static str,
    manager: SessionManager,
    remote: mpsc::UnboundedReceiver<NotificationKind>,
}

impl Tab {
    fn open(
        name: &'static str,
        store: Arc<dyn KeyValueStore>,
        channel: &BroadcastChannel,
        api: Arc<FakeApi>,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
    ) -> Self {
        let context = ContextId::new();
        let hub = EventHub::new(Arc::new(channel.join(context)));
        let manager = SessionManager::new(store, hub.clone(), api, clock, config.clone());

        let (tx, remote) = mpsc::unbounded_channel();
        for kind in [NotificationKind::AuthChanged, NotificationKind::CartChanged] {
            let tx = tx.clone();
            hub.on(kind, move |event| {
                if event.origin == Origin::Remote {
                    let _ = tx.send(event.notification.kind());
                }
            });
        }

        tracing::info!(tab = name, %context, status = ?manager.status(), "Tab opened");
        Self {
            name,
            manager,
            remote,
        }
    }

    /// Wait for the next notification from another tab.
    async fn hear(&mut self) {
        match tokio::time::timeout(PROPAGATION_WAIT, self.remote.recv()).await {
            Ok(Some(kind)) => tracing::info!(
                tab = self.name,
                kind = kind.as_str(),
                status = ?self.manager.status(),
                cart_id = ?self.manager.cart_id(),
                "Heard from sibling"
            ),
            Ok(None) => tracing::warn!(tab = self.name, "Hub closed"),
            Err(_) => tracing::warn!(tab = self.name, "No notification from sibling"),
        }
    }
}

/// One store handle per tab, both on the same medium.
fn open_stores(
    config: &SessionConfig,
    clock: Arc<dyn Clock>,
) -> (Arc<dyn KeyValueStore>, Arc<dyn KeyValueStore>) {
    match std::env::var("STOREFRONT_SIM_STORE_PATH") {
        Ok(path) => {
            tracing::info!(%path, "Using file-backed store");
            (
                Arc::new(FileStore::new(&path, config.cookie_domain.clone(), Arc::clone(&clock))),
                Arc::new(FileStore::new(&path, config.cookie_domain.clone(), clock)),
            )
        }
        Err(_) => {
            let store = MemoryStore::new(config.cookie_domain.clone(), clock);
            (Arc::new(store.clone()), Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_sim=info,storefront_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = SessionConfig::from_env();
    tracing::info!(
        channel = %config.channel_id,
        domain = %config.cookie_domain,
        "Loaded session configuration"
    );
    let timeout = config.request_timeout();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let api = Arc::new(FakeApi::new());

    // --- Shared medium ---
    let registry = ChannelRegistry::new();
    let channel = registry.channel(&config.channel_id);
    let (store_a, store_b) = open_stores(&config, Arc::clone(&clock));

    let mut a = Tab::open("a", store_a, &channel, Arc::clone(&api), Arc::clone(&clock), &config);
    let mut b = Tab::open("b", store_b, &channel, Arc::clone(&api), Arc::clone(&clock), &config);

    // --- Sign in on A, B follows ---
    let status = a
        .manager
        .login(
            LoginRequest {
                email: "shopper@example.com".to_string(),
                password: "not-a-real-password".to_string(),
                remember_user: true,
            },
            timeout,
        )
        .await?;
    tracing::info!(tab = a.name, ?status, "Signed in");
    b.hear().await;

    // --- Cart created on B, A follows ---
    let cart_id = b.manager.ensure_cart(timeout).await?;
    tracing::info!(tab = b.name, %cart_id, "Cart ready");
    a.hear().await;

    // Token is fresh, so this makes no request.
    let status = b.manager.refresh(timeout).await?;
    tracing::info!(tab = b.name, ?status, "Refresh checked");

    // --- Redirects ---
    let cache = Arc::new(RedirectCache::new(config.redirect_ttl(), Arc::clone(&clock)));
    cache.seed([("/summer-2018", "/collections/summer")]);
    let resolver = RedirectResolver::new(cache, api);
    for path in ["/Old-Sale/", "/old-sale", "/summer-2018", "/sale", "/checkout"] {
        let target = resolver.resolve(path, timeout).await?;
        tracing::info!(%path, ?target, "Resolved");
    }

    // --- Sign out on B, A follows, cart survives ---
    b.manager.logout();
    a.hear().await;
    tracing::info!(
        status = ?a.manager.status(),
        cart_id = ?a.manager.cart_id(),
        "Final state"
    );

    Ok(())
}
