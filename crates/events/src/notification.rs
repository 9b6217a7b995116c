use serde::{Deserialize, Serialize};
use storefront_core::SessionStatus;

/// Name a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    AuthChanged,
    CartChanged,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthChanged => "auth-changed",
            Self::CartChanged => "cart-changed",
        }
    }
}

/// Something in the persisted session changed.
///
/// Payloads are hints. Receivers re-read the store rather than trusting
/// them, because the store is what every context actually shares.
///
/// Serialized as `{ "kind": "auth-changed", "payload": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum ChangeNotification {
    AuthChanged(AuthChange),
    CartChanged(CartChange),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChange {
    pub user_id: Option<String>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartChange {
    pub cart_id: Option<String>,
}

impl ChangeNotification {
    pub fn auth(user_id: Option<String>, status: SessionStatus) -> Self {
        Self::AuthChanged(AuthChange { user_id, status })
    }

    pub fn cart(cart_id: Option<String>) -> Self {
        Self::CartChanged(CartChange { cart_id })
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::AuthChanged(_) => NotificationKind::AuthChanged,
            Self::CartChanged(_) => NotificationKind::CartChanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_changed_wire_shape() {
        let note = ChangeNotification::auth(Some("42".to_string()), SessionStatus::Authenticated);
        let json = serde_json::to_value(&note).expect("serialization should succeed");

        assert_eq!(json["kind"], "auth-changed");
        assert_eq!(json["payload"]["userId"], "42");
        assert_eq!(json["payload"]["status"], "authenticated");
    }

    #[test]
    fn cart_changed_parses_from_wire() {
        let json = serde_json::json!({ "kind": "cart-changed", "payload": { "cartId": null } });
        let note: ChangeNotification =
            serde_json::from_value(json).expect("deserialization should succeed");
        assert_eq!(note, ChangeNotification::cart(None));
        assert_eq!(note.kind(), NotificationKind::CartChanged);
    }

    #[test]
    fn kind_names_match_serde_names() {
        for kind in [NotificationKind::AuthChanged, NotificationKind::CartChanged] {
            let json = serde_json::to_value(kind).expect("serialize");
            assert_eq!(json, kind.as_str());
        }
    }
}
