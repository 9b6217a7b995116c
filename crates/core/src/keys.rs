//! Persisted key names and their default lifetimes.
//!
//! | key            | TTL default | TTL if remembered |
//! |----------------|-------------|-------------------|
//! | `user`         | 1800s       | 604800s           |
//! | `user-auth`    | 1800s       | 604800s           |
//! | `user-type`    | 1800s       | 604800s           |
//! | `refresh-token`| 1800s       | 604800s           |
//! | `auth-issued`  | 1800s       | 604800s           |
//! | `cart-id`      | 604800s     | 604800s           |

/// User id of the signed-in customer.
pub const USER: &str = "user";

/// Access token.
pub const USER_AUTH: &str = "user-auth";

/// Customer type (e.g. `"b2c"`, `"b2b"`).
pub const USER_TYPE: &str = "user-type";

pub const REFRESH_TOKEN: &str = "refresh-token";

/// Token timing (`issuedAt`, `expiresIn`, `rememberUser`) as JSON.
pub const AUTH_ISSUED: &str = "auth-issued";

pub const CART_ID: &str = "cart-id";

/// Every key that belongs to the authentication record.
pub const AUTH_KEYS: [&str; 5] = [USER, USER_AUTH, USER_TYPE, REFRESH_TOKEN, AUTH_ISSUED];

/// Default lifetime of auth keys (30 minutes).
pub const DEFAULT_AUTH_TTL_SECS: i64 = 1800;

/// Lifetime of auth keys when the user asked to be remembered (7 days).
pub const DEFAULT_REMEMBER_TTL_SECS: i64 = 604_800;

/// Lifetime of the cart id (7 days).
pub const DEFAULT_CART_TTL_SECS: i64 = 604_800;
