//! Boundary to the remote GraphQL API.
//!
//! The API client itself lives outside this crate; everything here needs
//! only [`QueryTransport::run_query`]. [`execute`] wraps one call with the
//! caller's timeout and turns the raw response into a typed field or a
//! [`SessionError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storefront_core::SessionError;

/// Exchange credentials for a token pair.
pub const LOGIN_MUTATION: &str = r#"
mutation generateCustomerToken($email: String!, $password: String!) {
  generateCustomerToken(email: $email, password: $password) {
    token
    refreshToken
    expiresIn
    customerId
    customerType
  }
}"#;

/// Exchange a refresh token for a new token pair.
pub const REFRESH_MUTATION: &str = r#"
mutation refreshCustomerToken($refreshToken: String!) {
  refreshCustomerToken(refreshToken: $refreshToken) {
    token
    refreshToken
    expiresIn
    customerId
    customerType
  }
}"#;

/// Create a cart and return its id.
pub const CREATE_CART_MUTATION: &str = r#"
mutation createEmptyCart {
  createEmptyCart
}"#;

/// Resolve a storefront path to its canonical location.
pub const URL_RESOLVER_QUERY: &str = r#"
query urlResolver($url: String!) {
  urlResolver(url: $url) {
    canonicalUrl
  }
}"#;

/// The transport could not deliver the request or read the answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transport failure: {0}")]
pub struct TransportError(pub String);

/// Something that can run a GraphQL document.
///
/// Returns the whole response body (`{ "data": ..., "errors": [...] }`).
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn run_query(&self, document: &str, variables: Value) -> Result<Value, TransportError>;
}

/// Run `document` and deserialize `data.<field>`.
///
/// - Timeout or transport failure -> [`SessionError::TransientNetwork`].
/// - Non-empty `errors` array -> [`SessionError::Rejected`].
/// - Missing or ill-shaped field -> [`SessionError::UnexpectedResponse`].
pub async fn execute<T: DeserializeOwned>(
    transport: &dyn QueryTransport,
    document: &str,
    field: &str,
    variables: Value,
    timeout: Duration,
) -> Result<T, SessionError> {
    let response = match tokio::time::timeout(timeout, transport.run_query(document, variables))
        .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(SessionError::TransientNetwork(e.to_string())),
        Err(_) => {
            return Err(SessionError::TransientNetwork(format!(
                "{field} timed out after {}ms",
                timeout.as_millis()
            )))
        }
    };

    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
                .collect();
            return Err(SessionError::Rejected(messages.join("; ")));
        }
    }

    let value = response
        .get("data")
        .and_then(|data| data.get(field))
        .cloned()
        .ok_or_else(|| SessionError::UnexpectedResponse(format!("missing data.{field}")))?;

    serde_json::from_value(value)
        .map_err(|e| SessionError::UnexpectedResponse(format!("data.{field}: {e}")))
}
