//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use storefront_core::{ContextId, ManualClock, SessionConfig};
use storefront_events::{BroadcastBus, BroadcastChannel, EventHub, NoopBus};
use storefront_session::{QueryTransport, SessionManager, TransportError};
use storefront_store::MemoryStore;

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const DOMAIN: &str = "shop.test";

/// What the fake API does for one call.
pub enum Reply {
    Data(Value),
    Fail(TransportError),
    Stall,
}

/// Scripted transport. Replies are consumed in order; every call is
/// counted, including ones that stall.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    documents: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_data(&self, field: &str, value: Value) {
        let mut data = serde_json::Map::new();
        data.insert(field.to_string(), value);
        self.push(Reply::Data(json!({ "data": data })));
    }

    pub fn push_errors(&self, message: &str) {
        self.push(Reply::Data(json!({ "data": null, "errors": [{ "message": message }] })));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryTransport for ScriptedTransport {
    async fn run_query(&self, document: &str, _variables: Value) -> Result<Value, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents.lock().unwrap().push(document.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Data(value)) => Ok(value),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Stall) => std::future::pending().await,
            None => Err(TransportError("no scripted reply".to_string())),
        }
    }
}

/// Token grant payload as the API returns it.
pub fn grant(token: &str, refresh: Option<&str>, expires_in: i64, customer_id: &str) -> Value {
    json!({
        "token": token,
        "refreshToken": refresh,
        "expiresIn": expires_in,
        "customerId": customer_id,
        "customerType": "b2c",
    })
}

pub fn login_grant(transport: &ScriptedTransport, token: &str, refresh: Option<&str>) {
    transport.push_data("generateCustomerToken", grant(token, refresh, 3600, "42"));
}

/// One execution context: its own hub and manager over a shared store.
pub struct Context {
    pub manager: SessionManager,
    pub hub: EventHub,
    pub transport: Arc<ScriptedTransport>,
}

pub fn context(
    store: &MemoryStore,
    bus: Arc<dyn BroadcastBus>,
    clock: &ManualClock,
) -> Context {
    let hub = EventHub::new(bus);
    let transport = ScriptedTransport::new();
    let manager = SessionManager::new(
        Arc::new(store.clone()),
        hub.clone(),
        transport.clone(),
        Arc::new(clock.clone()),
        SessionConfig::default(),
    );
    Context {
        manager,
        hub,
        transport,
    }
}

/// A context with no sibling contexts.
pub fn isolated(store: &MemoryStore, clock: &ManualClock) -> Context {
    context(store, Arc::new(NoopBus), clock)
}

/// A context attached to `channel` under a fresh id.
pub fn joined(store: &MemoryStore, channel: &BroadcastChannel, clock: &ManualClock) -> Context {
    context(store, Arc::new(channel.join(ContextId::new())), clock)
}

pub fn store(clock: &ManualClock) -> MemoryStore {
    MemoryStore::new(DOMAIN, Arc::new(clock.clone()))
}
