//! Client session synchronisation for the storefront.
//!
//! - [`SessionManager`]: auth token and cart identity for one execution
//!   context, persisted in a shared store and kept consistent with sibling
//!   contexts through an event hub.
//! - [`RedirectCache`] / [`RedirectResolver`]: TTL cache of legacy path
//!   redirects consulted by routing before navigation.
//! - [`QueryTransport`]: the one operation needed from the GraphQL client.

pub mod manager;
pub mod record;
pub mod redirect;
pub mod resolver;
pub mod transport;

pub use manager::{LoginRequest, SessionManager};
pub use record::SessionRecord;
pub use redirect::{normalize_path, RedirectCache, RedirectEntry};
pub use resolver::RedirectResolver;
pub use transport::{QueryTransport, TransportError};
