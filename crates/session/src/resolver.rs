//! Redirect resolution for routing middleware: cache first, then one remote
//! `urlResolver` call per miss, with the answer written back to the cache.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use storefront_core::SessionError;

use crate::redirect::{normalize_path, RedirectCache};
use crate::transport::{self, QueryTransport};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlRewrite {
    canonical_url: String,
}

pub struct RedirectResolver {
    cache: Arc<RedirectCache>,
    transport: Arc<dyn QueryTransport>,
}

impl RedirectResolver {
    pub fn new(cache: Arc<RedirectCache>, transport: Arc<dyn QueryTransport>) -> Self {
        Self { cache, transport }
    }

    pub fn cache(&self) -> &RedirectCache {
        &self.cache
    }

    /// Where `path` should redirect to, or `None` to let navigation proceed.
    ///
    /// Only positive answers are cached. A failure leaves the cache as it
    /// was.
    pub async fn resolve(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<Option<String>, SessionError> {
        if let Some(target) = self.cache.lookup(path) {
            return Ok(Some(target));
        }

        let rewrite: Option<UrlRewrite> = transport::execute(
            self.transport.as_ref(),
            transport::URL_RESOLVER_QUERY,
            "urlResolver",
            json!({ "url": path }),
            timeout,
        )
        .await?;

        let Some(rewrite) = rewrite else {
            return Ok(None);
        };
        // Already canonical: nothing to redirect, nothing to cache.
        if normalize_path(&rewrite.canonical_url) == normalize_path(path) {
            return Ok(None);
        }

        tracing::debug!(from = %path, to = %rewrite.canonical_url, "Resolved redirect");
        self.cache.put(path, &rewrite.canonical_url);
        Ok(Some(rewrite.canonical_url))
    }
}
