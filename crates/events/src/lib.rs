//! Change notifications and their delivery across execution contexts.
//!
//! - [`ChangeNotification`]: the closed set of things that can change.
//! - [`BroadcastBus`]: best-effort fan-out to *other* execution contexts.
//!   [`BroadcastChannel`] is the in-process backend (one `tokio::sync::broadcast`
//!   channel per logical channel id); [`NoopBus`] is the fallback when no
//!   transport exists.
//! - [`EventHub`]: local listener registry bridged onto a bus.

pub mod bus;
pub mod hub;
pub mod notification;

pub use bus::{
    BroadcastBus, BroadcastChannel, BusMessage, BusSubscription, ChannelBus, ChannelRegistry,
    NoopBus, RemoteHandler,
};
pub use hub::{EventHub, Handler, HubEvent, Origin, Subscription};
pub use notification::{AuthChange, CartChange, ChangeNotification, NotificationKind};
