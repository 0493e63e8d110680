//! Proposal data models
//!
//! Defines proposals, their line items, the status workflow and version
//! history records.

use crate::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Proposal status in the sales workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Being written
    #[default]
    Draft,
    /// Waiting for internal approval
    InReview,
    /// Approved internally, ready to send
    Approved,
    /// Sent back for rework
    Rejected,
    /// Sent to the customer
    Submitted,
    /// Customer accepted
    Accepted,
    /// Customer declined
    Declined,
    Archived,
}

text_enum!(ProposalStatus {
    Draft => "draft",
    InReview => "in_review",
    Approved => "approved",
    Rejected => "rejected",
    Submitted => "submitted",
    Accepted => "accepted",
    Declined => "declined",
    Archived => "archived",
});

impl ProposalStatus {
    /// Whether the workflow allows moving from `self` to `next`
    pub fn can_transition(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        match (self, next) {
            (Archived, _) => false,
            (_, Archived) => true,
            (Draft, InReview)
            | (InReview, Approved)
            | (InReview, Rejected)
            | (Rejected, Draft)
            | (Approved, Submitted)
            | (Submitted, Accepted)
            | (Submitted, Declined) => true,
            _ => false,
        }
    }

    /// Content (title, line items, ...) may only change in these states
    pub fn is_editable(self) -> bool {
        matches!(self, ProposalStatus::Draft | ProposalStatus::Rejected)
    }

    /// Transitions into these states need an approver (manager or admin)
    pub fn requires_approver(self) -> bool {
        matches!(self, ProposalStatus::Approved | ProposalStatus::Rejected)
    }

    /// Terminal outcomes
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            ProposalStatus::Accepted | ProposalStatus::Declined | ProposalStatus::Archived
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

text_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// A priced line on a proposal, stored as JSONB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub discount_percent: u8,
}

impl LineItem {
    /// Discounted line total, rounded half up; None if it does not fit in i64
    pub fn total_cents(&self) -> Option<i64> {
        let gross = i128::from(self.quantity) * i128::from(self.unit_price_cents);
        let net_x100 = gross * (100 - i128::from(self.discount_percent.min(100)));
        let rounded = (net_x100 + 50) / 100;
        i64::try_from(rounded).ok()
    }
}

/// Sum of the line totals
pub fn total_cents(items: &[LineItem]) -> Result<i64, AppError> {
    items
        .iter()
        .try_fold(0i64, |sum, item| {
            item.total_cents().and_then(|line| sum.checked_add(line))
        })
        .ok_or_else(|| AppError::Validation("Proposal total is too large".to_string()))
}

/// Line item as submitted; product lines may omit name and price
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "Line item name cannot be empty"))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 1_000_000, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(range(min = 0, max = super::product::MAX_PRICE_CENTS, message = "Unit price must be between 0 and 10^12 cents"))]
    pub unit_price_cents: Option<i64>,
    #[validate(range(max = 100, message = "Discount must be between 0 and 100"))]
    #[serde(default)]
    pub discount_percent: u8,
}

/// A sales proposal sent to a customer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub line_items: Vec<LineItem>,
    pub total_cents: i64,
    pub currency: String,
    /// Incremented on every content change or transition
    pub version: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 3, max = 200, message = "Title must be 3-200 characters"))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    #[validate(regex(path = *super::product::CURRENCY, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
    #[validate(length(max = 200, message = "A proposal can have at most 200 line items"))]
    #[validate(nested)]
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProposalRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 3, max = 200, message = "Title must be 3-200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 200, message = "A proposal can have at most 200 line items"))]
    #[validate(nested)]
    pub line_items: Option<Vec<LineItemInput>>,
    #[validate(length(max = 500))]
    pub change_summary: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    pub status: ProposalStatus,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkStatusRequest {
    #[validate(length(min = 1, max = 100, message = "Provide between 1 and 100 ids"))]
    pub ids: Vec<Uuid>,
    pub status: ProposalStatus,
}

/// Per-id outcome of a bulk operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub id: Uuid,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalFilter {
    pub search: Option<String>,
    pub status: Option<ProposalStatus>,
    pub customer_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProposalFilter {
    /// Stable cache key fragment for this filter
    pub fn cache_fragment(&self) -> String {
        format!(
            "search={}&status={}&customer={}&priority={}&page={}&limit={}",
            self.search.as_deref().unwrap_or_default(),
            self.status.map(|s| s.as_str()).unwrap_or_default(),
            self.customer_id.map(|c| c.to_string()).unwrap_or_default(),
            self.priority.map(|p| p.as_str()).unwrap_or_default(),
            self.page.unwrap_or(1),
            self.limit.unwrap_or(super::DEFAULT_PAGE_SIZE),
        )
    }
}

/// Immutable snapshot written on every proposal change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalVersion {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub version: i32,
    pub snapshot: serde_json::Value,
    pub change_summary: String,
    pub changed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Aggregates for the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_proposals: i64,
    pub by_status: std::collections::BTreeMap<String, i64>,
    pub open_pipeline_cents: i64,
    pub won_cents: i64,
    pub win_rate: Option<f64>,
    pub customers: i64,
    pub active_products: i64,
}

impl DashboardStats {
    /// accepted / (accepted + declined); None until something has closed
    pub fn compute_win_rate(&mut self) {
        let accepted = *self.by_status.get(ProposalStatus::Accepted.as_str()).unwrap_or(&0);
        let declined = *self.by_status.get(ProposalStatus::Declined.as_str()).unwrap_or(&0);
        let closed = accepted + declined;
        self.win_rate = (closed > 0).then(|| accepted as f64 / closed as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use super::ProposalStatus::*;

    const ALL: [ProposalStatus; 8] = [
        Draft, InReview, Approved, Rejected, Submitted, Accepted, Declined, Archived,
    ];

    fn item(quantity: i32, unit_price_cents: i64, discount_percent: u8) -> LineItem {
        LineItem {
            product_id: None,
            name: "Consulting day".into(),
            quantity,
            unit_price_cents,
            discount_percent,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Draft.can_transition(InReview));
        assert!(InReview.can_transition(Approved));
        assert!(Approved.can_transition(Submitted));
        assert!(Submitted.can_transition(Accepted));
        assert!(Submitted.can_transition(Declined));
    }

    #[test]
    fn test_rejection_loop() {
        assert!(InReview.can_transition(Rejected));
        assert!(Rejected.can_transition(Draft));
        assert!(!Rejected.can_transition(Approved));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Draft.can_transition(Approved));
        assert!(!Draft.can_transition(Submitted));
        assert!(!Accepted.can_transition(Draft));
        assert!(!Draft.can_transition(Draft));
        for status in ALL {
            assert!(!Archived.can_transition(status));
        }
    }

    #[test]
    fn test_anything_live_can_be_archived() {
        for status in ALL {
            if status != Archived {
                assert!(status.can_transition(Archived), "{status} -> archived");
            }
        }
    }

    #[test]
    fn test_editable_states() {
        let editable: Vec<_> = ALL
            .into_iter()
            .filter(|s| s.is_editable())
            .collect();
        assert_eq!(editable, vec![Draft, Rejected]);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&InReview).unwrap(), "\"in_review\"");
        assert_eq!("in_review".parse::<ProposalStatus>().unwrap(), InReview);
    }

    #[test]
    fn test_line_totals() {
        assert_eq!(item(3, 10_000, 0).total_cents(), Some(30_000));
        assert_eq!(item(3, 10_000, 15).total_cents(), Some(25_500));
        // 1 * 999 * 0.67 = 669.33
        assert_eq!(item(1, 999, 33).total_cents(), Some(669));
        // 1 * 150 * 0.99 = 148.5 rounds up
        assert_eq!(item(1, 150, 1).total_cents(), Some(149));
        assert_eq!(item(5, 10_000, 100).total_cents(), Some(0));
        assert_eq!(total_cents(&[item(2, 500, 0), item(1, 1_000, 50)]).unwrap(), 1_500);
    }

    #[test]
    fn test_oversized_line_is_not_wrapped() {
        let line = item(1_000_000, 10_000_000_000_000, 0);
        assert_eq!(line.total_cents(), None);
        assert!(matches!(total_cents(&[line]), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_total_overflow_is_a_validation_error() {
        let half = i64::MAX / 2;
        let lines = [item(1, half, 0), item(1, half, 0), item(1, half, 0)];
        assert!(matches!(total_cents(&lines), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_unit_price_is_bounded() {
        let req: CreateProposalRequest = serde_json::from_value(serde_json::json!({
            "customerId": Uuid::new_v4(),
            "title": "Q3 renewal",
            "lineItems": [{ "name": "Seats", "quantity": 1_000_000, "unitPriceCents": 10_000_000_000_000i64 }]
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("line_items"));
    }

    #[test]
    fn test_line_item_count_is_bounded() {
        let line = serde_json::json!({ "name": "Seats", "quantity": 1, "unitPriceCents": 100 });
        let mut req: CreateProposalRequest = serde_json::from_value(serde_json::json!({
            "customerId": Uuid::new_v4(),
            "title": "Q3 renewal",
            "lineItems": vec![line; 200]
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        req.line_items.push(req.line_items[0].clone());
        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("line_items"));
    }

    #[test]
    fn test_nested_line_item_validation() {
        let req: CreateProposalRequest = serde_json::from_value(serde_json::json!({
            "customerId": Uuid::new_v4(),
            "title": "Q3 renewal",
            "lineItems": [{ "name": "Seats", "quantity": 0, "unitPriceCents": 100 }]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_win_rate() {
        let mut stats = DashboardStats::default();
        stats.compute_win_rate();
        assert_eq!(stats.win_rate, None);

        stats.by_status.insert("accepted".into(), 3);
        stats.by_status.insert("declined".into(), 1);
        stats.compute_win_rate();
        assert_eq!(stats.win_rate, Some(0.75));
    }
}
