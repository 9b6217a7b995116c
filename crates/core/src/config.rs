use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::keys::{DEFAULT_AUTH_TTL_SECS, DEFAULT_CART_TTL_SECS, DEFAULT_REMEMBER_TTL_SECS};

/// Default broadcast channel name.
const DEFAULT_CHANNEL_ID: &str = "storefront";
/// Default cookie domain.
const DEFAULT_COOKIE_DOMAIN: &str = "localhost";
/// How long before expiry a token counts as "expiring".
const DEFAULT_SOON_WINDOW_SECS: i64 = 60;
/// Default redirect cache entry lifetime.
const DEFAULT_REDIRECT_TTL_SECS: i64 = 300;
/// Default timeout for login / refresh / redirect resolution.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Session synchronisation settings.
///
/// All fields have defaults matching the documented cookie lifetimes;
/// override via environment variables with [`SessionConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Logical broadcast channel shared by one application instance.
    pub channel_id: String,
    /// Domain every persisted key is scoped to.
    pub cookie_domain: String,
    pub auth_ttl_secs: i64,
    pub remember_ttl_secs: i64,
    pub cart_ttl_secs: i64,
    pub soon_window_secs: i64,
    pub redirect_ttl_secs: i64,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
            cookie_domain: DEFAULT_COOKIE_DOMAIN.to_string(),
            auth_ttl_secs: DEFAULT_AUTH_TTL_SECS,
            remember_ttl_secs: DEFAULT_REMEMBER_TTL_SECS,
            cart_ttl_secs: DEFAULT_CART_TTL_SECS,
            soon_window_secs: DEFAULT_SOON_WINDOW_SECS,
            redirect_ttl_secs: DEFAULT_REDIRECT_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default      |
    /// |-----------------------------------|--------------|
    /// | `STOREFRONT_CHANNEL_ID`           | `storefront` |
    /// | `STOREFRONT_COOKIE_DOMAIN`        | `localhost`  |
    /// | `STOREFRONT_AUTH_TTL_SECS`        | `1800`       |
    /// | `STOREFRONT_REMEMBER_TTL_SECS`    | `604800`     |
    /// | `STOREFRONT_CART_TTL_SECS`        | `604800`     |
    /// | `STOREFRONT_REFRESH_WINDOW_SECS`  | `60`         |
    /// | `STOREFRONT_REDIRECT_TTL_SECS`    | `300`        |
    /// | `STOREFRONT_REQUEST_TIMEOUT_SECS` | `10`         |
    ///
    /// Unparsable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary
    /// lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            channel_id: lookup("STOREFRONT_CHANNEL_ID")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.channel_id),
            cookie_domain: lookup("STOREFRONT_COOKIE_DOMAIN")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.cookie_domain),
            auth_ttl_secs: parse_or(&lookup, "STOREFRONT_AUTH_TTL_SECS", defaults.auth_ttl_secs),
            remember_ttl_secs: parse_or(
                &lookup,
                "STOREFRONT_REMEMBER_TTL_SECS",
                defaults.remember_ttl_secs,
            ),
            cart_ttl_secs: parse_or(&lookup, "STOREFRONT_CART_TTL_SECS", defaults.cart_ttl_secs),
            soon_window_secs: parse_or(
                &lookup,
                "STOREFRONT_REFRESH_WINDOW_SECS",
                defaults.soon_window_secs,
            ),
            redirect_ttl_secs: parse_or(
                &lookup,
                "STOREFRONT_REDIRECT_TTL_SECS",
                defaults.redirect_ttl_secs,
            ),
            request_timeout_secs: parse_or(
                &lookup,
                "STOREFRONT_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
        }
    }

    /// Lifetime of the auth keys for a login with the given remember-me flag.
    pub fn auth_ttl(&self, remember_user: bool) -> Duration {
        if remember_user {
            Duration::seconds(self.remember_ttl_secs)
        } else {
            Duration::seconds(self.auth_ttl_secs)
        }
    }

    pub fn cart_ttl(&self) -> Duration {
        Duration::seconds(self.cart_ttl_secs)
    }

    pub fn soon_window(&self) -> Duration {
        Duration::seconds(self.soon_window_secs)
    }

    pub fn redirect_ttl(&self) -> Duration {
        Duration::seconds(self.redirect_ttl_secs)
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, %default, "Invalid value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_cookie_lifetimes() {
        let config = SessionConfig::default();
        assert_eq!(config.auth_ttl(false), Duration::seconds(1800));
        assert_eq!(config.auth_ttl(true), Duration::seconds(604_800));
        assert_eq!(config.cart_ttl(), Duration::seconds(604_800));
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = SessionConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("STOREFRONT_CHANNEL_ID", "shop-eu"),
            ("STOREFRONT_REFRESH_WINDOW_SECS", "120"),
            ("STOREFRONT_REQUEST_TIMEOUT_SECS", " 3 "),
        ]));
        assert_eq!(config.channel_id, "shop-eu");
        assert_eq!(config.soon_window(), Duration::seconds(120));
        assert_eq!(config.request_timeout(), StdDuration::from_secs(3));
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("STOREFRONT_AUTH_TTL_SECS", "half an hour"),
            ("STOREFRONT_COOKIE_DOMAIN", "  "),
        ]));
        assert_eq!(config.auth_ttl_secs, 1800);
        assert_eq!(config.cookie_domain, "localhost");
    }
}
