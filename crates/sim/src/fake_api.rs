//! In-process stand-in for the storefront GraphQL API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use storefront_session::transport::{
    CREATE_CART_MUTATION, LOGIN_MUTATION, REFRESH_MUTATION, URL_RESOLVER_QUERY,
};
use storefront_session::{QueryTransport, TransportError};

const TOKEN_LIFETIME_SECS: i64 = 3600;

pub struct FakeApi {
    next_id: AtomicU64,
    rewrites: HashMap<&'static str, &'static str>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            rewrites: HashMap::from([
                ("/old-sale", "/sale"),
                ("/summer-2019", "/collections/summer"),
                ("/sale", "/sale"),
            ]),
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn grant(&self) -> Value {
        let n = self.next();
        json!({
            "token": format!("access-{n}"),
            "refreshToken": format!("refresh-{n}"),
            "expiresIn": TOKEN_LIFETIME_SECS,
            "customerId": "1001",
            "customerType": "b2c",
        })
    }
}

#[async_trait]
impl QueryTransport for FakeApi {
    async fn run_query(&self, document: &str, variables: Value) -> Result<Value, TransportError> {
        let data = if document == LOGIN_MUTATION {
            json!({ "generateCustomerToken": self.grant() })
        } else if document == REFRESH_MUTATION {
            json!({ "refreshCustomerToken": self.grant() })
        } else if document == CREATE_CART_MUTATION {
            json!({ "createEmptyCart": format!("cart-{}", self.next()) })
        } else if document == URL_RESOLVER_QUERY {
            let url = variables["url"].as_str().unwrap_or_default().to_lowercase();
            let rewrite = self
                .rewrites
                .get(url.trim_end_matches('/'))
                .map(|target| json!({ "canonicalUrl": target }));
            json!({ "urlResolver": rewrite })
        } else {
            return Err(TransportError("unknown document".to_string()));
        };

        Ok(json!({ "data": data }))
    }
}
