//! Local listener registry bridged onto a [`BroadcastBus`].
//!
//! [`EventHub::emit`] runs every matching local listener synchronously, in
//! subscription order, and then publishes on the bus. Notifications that
//! arrive from the bus go to local listeners only and are never published
//! again, so two hubs on one channel cannot bounce a message between them.
//!
//! The bus subscription (the bridge) lives as long as the hub does and is
//! independent of how many listeners are registered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::bus::{BroadcastBus, BusSubscription};
use crate::notification::{ChangeNotification, NotificationKind};

/// Where a delivered notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Emitted by this execution context.
    Local,
    /// Relayed from another execution context over the bus.
    Remote,
}

/// What a listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEvent {
    pub notification: ChangeNotification,
    pub origin: Origin,
}

/// Listener callback.
pub type Handler = Arc<dyn Fn(&HubEvent) + Send + Sync>;

/// Token returned by [`EventHub::on`] / [`EventHub::once`], used to remove
/// that one listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    kind: NotificationKind,
}

impl Subscription {
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }
}

struct Listener {
    id: u64,
    kind: NotificationKind,
    once: bool,
    handler: Handler,
}

struct HubInner {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
    bus: Arc<dyn BroadcastBus>,
}

impl HubInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        // A panicking listener runs outside the lock, so the list is intact.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self, event: &HubEvent) {
        let kind = event.notification.kind();
        // Snapshot under the lock, invoke outside it so listeners may
        // register or remove listeners themselves.
        let handlers: Vec<Handler> = {
            let mut listeners = self.listeners();
            let matching = listeners
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| Arc::clone(&l.handler))
                .collect();
            listeners.retain(|l| !(l.once && l.kind == kind));
            matching
        };

        for handler in handlers {
            handler(event);
        }
    }
}

/// Per-context event hub. Cloning shares the same listeners and bridge.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
    bridge: Arc<BusSubscription>,
}

impl EventHub {
    /// Create a hub and bridge it onto `bus`.
    pub fn new(bus: Arc<dyn BroadcastBus>) -> Self {
        let inner = Arc::new(HubInner {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bus: Arc::clone(&bus),
        });

        // Weak, so the bridge task does not keep a dropped hub alive.
        let weak: Weak<HubInner> = Arc::downgrade(&inner);
        let bridge = bus.subscribe(Arc::new(move |notification: ChangeNotification| {
            if let Some(hub) = weak.upgrade() {
                tracing::trace!(kind = notification.kind().as_str(), "Remote notification");
                hub.deliver(&HubEvent {
                    notification,
                    origin: Origin::Remote,
                });
            }
        }));

        Self {
            inner,
            bridge: Arc::new(bridge),
        }
    }

    /// Register `handler` for every notification of `kind`.
    pub fn on<F>(&self, kind: NotificationKind, handler: F) -> Subscription
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(handler))
    }

    /// Register `handler` for the next notification of `kind` only.
    pub fn once<F>(&self, kind: NotificationKind, handler: F) -> Subscription
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(handler))
    }

    /// Remove one listener, or every listener of `kind` when `subscription`
    /// is `None`. The bus bridge is untouched either way.
    pub fn off(&self, kind: NotificationKind, subscription: Option<Subscription>) {
        let mut listeners = self.inner.listeners();
        match subscription {
            Some(sub) => listeners.retain(|l| !(l.kind == kind && l.id == sub.id)),
            None => listeners.retain(|l| l.kind != kind),
        }
    }

    /// Deliver to local listeners, then publish to other contexts.
    pub fn emit(&self, notification: ChangeNotification) {
        let event = HubEvent {
            notification,
            origin: Origin::Local,
        };
        self.inner.deliver(&event);
        self.inner.bus.publish(&event.notification);
    }

    pub fn listener_count(&self, kind: NotificationKind) -> usize {
        self.inner
            .listeners()
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }

    /// Whether notifications from other contexts can reach this hub.
    pub fn is_bridged(&self) -> bool {
        self.bridge.is_active()
    }

    fn register(&self, kind: NotificationKind, once: bool, handler: Handler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push(Listener {
            id,
            kind,
            once,
            handler,
        });
        Subscription { id, kind }
    }
}
