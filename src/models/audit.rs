//! Audit trail records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    /// Dot-separated action name, e.g. `"proposal.created"`
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit record about to be written
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
}

impl NewAudit {
    pub fn new(tenant_id: Uuid, entity_type: &'static str, action: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            entity_type,
            entity_id: None,
            action: action.into(),
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn by(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn on(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let tenant = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let entity = Uuid::new_v4();
        let audit = NewAudit::new(tenant, "proposal", "proposal.created")
            .by(actor)
            .on(entity)
            .with_details(json!({"title": "Q3"}));

        assert_eq!(audit.actor_id, Some(actor));
        assert_eq!(audit.entity_id, Some(entity));
        assert_eq!(audit.details["title"], "Q3");
    }

    #[test]
    fn test_default_details_is_empty_object() {
        let audit = NewAudit::new(Uuid::new_v4(), "user", "user.login");
        assert_eq!(audit.details, json!({}));
    }
}
