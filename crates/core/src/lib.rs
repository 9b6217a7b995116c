//! Shared building blocks for storefront client session state.
//!
//! Zero internal dependencies so every other crate in the workspace
//! (store backends, event bus, session manager) can depend on it.

pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod token;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::SessionError;
pub use token::SessionToken;
pub use types::{ContextId, SessionStatus, Timestamp};
