//! Customer models

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CustomerTier {
    #[default]
    Standard,
    Premium,
    Enterprise,
}

text_enum!(CustomerTier {
    Standard => "standard",
    Premium => "premium",
    Enterprise => "enterprise",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

text_enum!(CustomerStatus {
    Active => "active",
    Inactive => "inactive",
    Archived => "archived",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub tier: CustomerTier,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ()./-]{6,32}$").expect("valid regex"));

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 255, message = "Customer name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE, message = "Invalid phone number"))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    #[serde(default)]
    pub tier: CustomerTier,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 255, message = "Customer name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE, message = "Invalid phone number"))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    pub tier: Option<CustomerTier>,
    pub status: Option<CustomerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFilter {
    pub search: Option<String>,
    pub status: Option<CustomerStatus>,
    pub tier: Option<CustomerTier>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        let mut req = CreateCustomerRequest {
            name: "Globex".into(),
            email: Some("buyer@globex.test".into()),
            phone: Some("+1 (555) 010-2030".into()),
            industry: None,
            tier: CustomerTier::Enterprise,
        };
        assert!(req.validate().is_ok());

        req.phone = Some("call me".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_filter_parses_enums() {
        let filter: CustomerFilter =
            serde_json::from_str(r#"{"status":"archived","tier":"premium","page":2}"#).unwrap();
        assert_eq!(filter.status, Some(CustomerStatus::Archived));
        assert_eq!(filter.tier, Some(CustomerTier::Premium));
        assert_eq!(filter.page, Some(2));
    }

    #[test]
    fn test_text_round_trip() {
        assert_eq!("enterprise".parse::<CustomerTier>().unwrap(), CustomerTier::Enterprise);
        assert_eq!(CustomerStatus::Inactive.to_string(), "inactive");
        assert!("gold".parse::<CustomerTier>().is_err());
    }
}
