//! Best-effort fan-out of change notifications between execution contexts.
//!
//! A [`BroadcastChannel`] is the shared medium for one application instance;
//! each execution context joins it and gets a [`ChannelBus`] that publishes
//! under its own [`ContextId`] and never hears its own messages back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use storefront_core::{ContextId, SessionError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::notification::ChangeNotification;

/// Callback invoked for each notification published by another context.
pub type RemoteHandler = Arc<dyn Fn(ChangeNotification) + Send + Sync>;

/// Envelope travelling on the channel:
/// `{ "origin": ..., "kind": ..., "payload": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub origin: ContextId,
    #[serde(flatten)]
    pub message: ChangeNotification,
}

/// Publish/subscribe between execution contexts.
///
/// Publishing is fire-and-forget with no delivery confirmation. Neither call
/// ever fails: when the transport is missing both degrade to no-ops.
pub trait BroadcastBus: Send + Sync {
    fn publish(&self, notification: &ChangeNotification);

    /// Invoke `handler` for every message published by another context.
    ///
    /// Delivery stops when the returned subscription is dropped.
    fn subscribe(&self, handler: RemoteHandler) -> BusSubscription;
}

/// Live subscription on a bus. Dropping it stops delivery.
#[derive(Debug, Default)]
pub struct BusSubscription {
    task: Option<JoinHandle<()>>,
}

impl BusSubscription {
    /// A subscription that never delivers anything.
    pub fn inactive() -> Self {
        Self { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// One logical channel shared by every context of an application instance.
///
/// Cloning shares the channel. Two independently created channels never
/// cross-talk, even when they carry the same name.
#[derive(Clone)]
pub struct BroadcastChannel {
    name: Arc<str>,
    sender: broadcast::Sender<BusMessage>,
}

impl BroadcastChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    /// When the buffer is full the oldest messages are dropped and slow
    /// subscribers skip ahead.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            name: Arc::from(name.into()),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach an execution context to the channel.
    pub fn join(&self, context: ContextId) -> ChannelBus {
        ChannelBus {
            channel: self.clone(),
            context,
        }
    }
}

/// Hands out the channel for a given id, creating it on first use.
///
/// Contexts that resolve the same id through the same registry talk to
/// each other; nothing else does.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<HashMap<String, BroadcastChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, channel_id: &str) -> BroadcastChannel {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(channel_id.to_string())
            .or_insert_with(|| BroadcastChannel::new(channel_id))
            .clone()
    }
}

/// One context's view of a [`BroadcastChannel`].
#[derive(Clone)]
pub struct ChannelBus {
    channel: BroadcastChannel,
    context: ContextId,
}

impl ChannelBus {
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl BroadcastBus for ChannelBus {
    fn publish(&self, notification: &ChangeNotification) {
        let message = BusMessage {
            origin: self.context,
            message: notification.clone(),
        };
        // Ignore the SendError; it only means nobody is listening.
        let _ = self.channel.sender.send(message);
    }

    fn subscribe(&self, handler: RemoteHandler) -> BusSubscription {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let error = SessionError::BroadcastUnavailable("no async runtime".to_string());
            tracing::debug!(
                channel = %self.channel.name,
                %error,
                "Running single-context"
            );
            return BusSubscription::inactive();
        };

        let mut receiver = self.channel.sender.subscribe();
        let me = self.context;
        let channel = Arc::clone(&self.channel.name);

        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) if envelope.origin == me => {}
                    Ok(envelope) => handler(envelope.message),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%channel, skipped = n, "Broadcast subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        BusSubscription { task: Some(task) }
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Bus used when there is no transport at all. Everything is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBus;

impl BroadcastBus for NoopBus {
    fn publish(&self, _notification: &ChangeNotification) {}

    fn subscribe(&self, _handler: RemoteHandler) -> BusSubscription {
        BusSubscription::inactive()
    }
}
