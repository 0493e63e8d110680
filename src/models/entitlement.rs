//! Per-tenant feature entitlements

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bulk product deletion
pub const PRODUCTS_BULK: &str = "products.bulk";
/// Bulk proposal status changes
pub const PROPOSALS_BULK: &str = "proposals.bulk";
/// Proposal version history
pub const PROPOSALS_VERSIONING: &str = "proposals.versioning";
/// Dashboard analytics
pub const DASHBOARD_ANALYTICS: &str = "dashboard.analytics";

/// Entitlements every new tenant starts with
pub const DEFAULT_ENTITLEMENTS: &[(&str, bool)] = &[
    (PRODUCTS_BULK, true),
    (PROPOSALS_BULK, true),
    (PROPOSALS_VERSIONING, true),
    (DASHBOARD_ANALYTICS, true),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub tenant_id: Uuid,
    pub key: String,
    pub enabled: bool,
    pub value: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) static ENTITLEMENT_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)*$").expect("valid regex")
});

pub fn is_valid_key(key: &str) -> bool {
    key.len() <= 100 && ENTITLEMENT_KEY.is_match(key)
}

#[derive(Debug, Deserialize)]
pub struct UpsertEntitlementRequest {
    pub enabled: bool,
    pub value: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert!(is_valid_key("proposals.bulk"));
        assert!(is_valid_key("ai_assist"));
        assert!(!is_valid_key("Proposals.Bulk"));
        assert!(!is_valid_key("proposals..bulk"));
        assert!(!is_valid_key(".hidden"));
        assert!(!is_valid_key(&"a".repeat(101)));
    }

    #[test]
    fn test_defaults_are_valid_keys() {
        for (key, _) in DEFAULT_ENTITLEMENTS {
            assert!(is_valid_key(key), "{key}");
        }
    }
}
