//! Product catalog models

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Upper bound for any unit price, 10^12 cents
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) static SKU: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{1,63}$").expect("valid regex"));

pub(crate) static CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid regex"));

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(regex(path = *SKU, message = "SKU must be 2-64 letters, digits, '-' or '_'"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 0, max = MAX_PRICE_CENTS, message = "Price must be between 0 and 10^12 cents"))]
    pub price_cents: i64,
    #[validate(regex(path = *CURRENCY, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(regex(path = *SKU, message = "SKU must be 2-64 letters, digits, '-' or '_'"))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Product name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 0, max = MAX_PRICE_CENTS, message = "Price must be between 0 and 10^12 cents"))]
    pub price_cents: Option<i64>,
    #[validate(regex(path = *CURRENCY, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductFilter {
    /// Stable cache key fragment for this filter
    pub fn cache_fragment(&self) -> String {
        format!(
            "search={}&category={}&active={}&page={}&limit={}",
            self.search.as_deref().unwrap_or_default(),
            self.category.as_deref().unwrap_or_default(),
            self.active.map(|a| a.to_string()).unwrap_or_default(),
            self.page.unwrap_or(1),
            self.limit.unwrap_or(super::DEFAULT_PAGE_SIZE),
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, max = 100, message = "Provide between 1 and 100 ids"))]
    pub ids: Vec<Uuid>,
}

/// SKUs are stored upper-case so lookups are case-insensitive
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateProductRequest {
        CreateProductRequest {
            sku: "cloud-std-01".into(),
            name: "Cloud Standard".into(),
            description: None,
            category: Some("Subscriptions".into()),
            price_cents: 12_900,
            currency: Some("EUR".into()),
            is_active: None,
        }
    }

    #[test]
    fn test_valid_product() {
        assert!(request().validate().is_ok());
        assert_eq!(normalize_sku(" cloud-std-01 "), "CLOUD-STD-01");
    }

    #[test]
    fn test_negative_price_and_bad_currency() {
        let mut req = request();
        req.price_cents = -1;
        req.currency = Some("euro".into());
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price_cents"));
        assert!(errors.field_errors().contains_key("currency"));
    }

    #[test]
    fn test_price_upper_bound() {
        let mut req = request();
        req.price_cents = MAX_PRICE_CENTS;
        assert!(req.validate().is_ok());
        req.price_cents = MAX_PRICE_CENTS + 1;
        assert!(req.validate().unwrap_err().field_errors().contains_key("price_cents"));
    }

    #[test]
    fn test_bad_sku() {
        let mut req = request();
        req.sku = "-".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bulk_delete_bounds() {
        assert!(BulkDeleteRequest { ids: vec![] }.validate().is_err());
        assert!(BulkDeleteRequest { ids: vec![Uuid::new_v4()] }.validate().is_ok());
    }

    #[test]
    fn test_cache_fragment_is_stable() {
        let filter = ProductFilter {
            search: Some("cloud".into()),
            active: Some(true),
            ..Default::default()
        };
        assert_eq!(
            filter.cache_fragment(),
            "search=cloud&category=&active=true&page=1&limit=20"
        );
    }
}
