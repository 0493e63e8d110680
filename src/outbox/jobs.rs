//! Outbox job types and their execution

use crate::cache::CacheService;
use crate::db::AuditService;
use crate::error::AppError;
use crate::models::{NewAudit, OutboxJob, ProposalStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::JobExecutor;

/// A job as stored in the outbox: `job_type` is the tag, the rest is payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum Job {
    #[serde(rename = "proposal.status_changed")]
    ProposalStatusChanged {
        proposal_id: Uuid,
        from: ProposalStatus,
        to: ProposalStatus,
        version: i32,
        actor_id: Uuid,
        comment: Option<String>,
    },
    #[serde(rename = "proposal.updated")]
    ProposalUpdated { proposal_id: Uuid, version: i32 },
    #[serde(rename = "cache.invalidate")]
    CacheInvalidate { prefix: String },
    #[serde(rename = "notification.email")]
    NotificationEmail {
        to: String,
        subject: String,
        body: String,
    },
}

impl Job {
    /// Split into the `(job_type, payload)` columns
    pub fn into_parts(&self) -> Result<(String, serde_json::Value), AppError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| AppError::Internal(format!("Failed to encode job: {}", e)))?;
        let job_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Internal("Encoded job has no type".to_string()))?;
        let payload = value
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or_else(|| json!({}));
        Ok((job_type, payload))
    }

    /// Rebuild a job from its stored columns; unknown types are an error
    pub fn from_parts(job_type: &str, payload: &serde_json::Value) -> Result<Self, AppError> {
        serde_json::from_value(json!({ "type": job_type, "payload": payload }))
            .map_err(|e| AppError::BadRequest(format!("Unsupported job '{}': {}", job_type, e)))
    }
}

/// SHA-256 over type, tenant and payload; identical jobs collapse on insert
pub fn idempotency_key(job_type: &str, tenant_id: Option<Uuid>, payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_type.as_bytes());
    hasher.update([0u8]);
    if let Some(tenant) = tenant_id {
        hasher.update(tenant.as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(payload.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Who gets told about a proposal entering `status`
fn notification_audience(status: ProposalStatus) -> Option<&'static str> {
    match status {
        ProposalStatus::InReview => Some("approvers"),
        ProposalStatus::Approved | ProposalStatus::Rejected => Some("author"),
        ProposalStatus::Accepted | ProposalStatus::Declined => Some("account_team"),
        _ => None,
    }
}

/// Executes jobs against the cache and the audit trail
pub struct OutboxExecutor {
    cache: Arc<CacheService>,
    audit: AuditService,
}

impl OutboxExecutor {
    pub fn new(cache: Arc<CacheService>, audit: AuditService) -> Self {
        Self { cache, audit }
    }

    async fn invalidate_tenant(&self, tenant_id: Uuid, resources: &[&str]) {
        for resource in resources {
            self.cache
                .invalidate_prefix(&format!("{}:{}:", tenant_id, resource))
                .await;
        }
    }
}

fn require_tenant(job: &OutboxJob) -> Result<Uuid, AppError> {
    job.tenant_id
        .ok_or_else(|| AppError::BadRequest(format!("Job {} has no tenant", job.job_type)))
}

impl JobExecutor for OutboxExecutor {
    async fn execute(&self, job: &OutboxJob) -> Result<(), AppError> {
        match Job::from_parts(&job.job_type, &job.payload)? {
            Job::ProposalStatusChanged {
                proposal_id,
                from,
                to,
                actor_id,
                ..
            } => {
                let tenant_id = require_tenant(job)?;
                self.invalidate_tenant(tenant_id, &["dashboard", "proposals"])
                    .await;

                if let Some(audience) = notification_audience(to) {
                    info!(%proposal_id, %from, %to, audience, "Proposal notification sent");
                    self.audit
                        .record_standalone(
                            NewAudit::new(tenant_id, "proposal", "notification.sent")
                                .by(actor_id)
                                .on(proposal_id)
                                .with_details(json!({
                                    "event": "proposal.status_changed",
                                    "from": from,
                                    "to": to,
                                    "audience": audience,
                                })),
                        )
                        .await?;
                }
            }
            Job::ProposalUpdated { proposal_id, version } => {
                let tenant_id = require_tenant(job)?;
                debug!(%proposal_id, version, "Proposal updated, invalidating caches");
                self.invalidate_tenant(tenant_id, &["dashboard", "proposals"])
                    .await;
            }
            Job::CacheInvalidate { prefix } => {
                // Tenant jobs may only touch their own keys
                if let Some(tenant_id) = job.tenant_id {
                    if !prefix.starts_with(&tenant_id.to_string()) {
                        return Err(AppError::Forbidden(format!(
                            "Prefix '{}' is outside tenant {}",
                            prefix, tenant_id
                        )));
                    }
                }
                let removed = self.cache.invalidate_prefix(&prefix).await;
                debug!(prefix, removed, "Cache invalidation job done");
            }
            Job::NotificationEmail { to, subject, .. } => {
                if !to.contains('@') {
                    return Err(AppError::BadRequest(format!("Invalid recipient '{}'", to)));
                }
                // No mail transport is configured; delivery is recorded only
                info!(to, subject, "Email notification delivered");
                if let Some(tenant_id) = job.tenant_id {
                    self.audit
                        .record_standalone(
                            NewAudit::new(tenant_id, "notification", "notification.sent")
                                .with_details(json!({ "channel": "email", "to": to, "subject": subject })),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::JobStatus;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn stored(job: &Job, tenant_id: Option<Uuid>) -> OutboxJob {
        let (job_type, payload) = job.into_parts().unwrap();
        OutboxJob {
            id: Uuid::new_v4(),
            tenant_id,
            idempotency_key: idempotency_key(&job_type, tenant_id, &payload),
            job_type,
            payload,
            status: JobStatus::Processing,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            processed_at: None,
        }
    }

    fn executor(cache: Arc<CacheService>) -> OutboxExecutor {
        // The pool never connects unless an audit record is written
        let pool = crate::db::create_pool(&DatabaseConfig::default()).unwrap();
        OutboxExecutor::new(cache, AuditService::new(pool))
    }

    #[test]
    fn test_job_parts_round_trip() {
        let job = Job::ProposalUpdated {
            proposal_id: Uuid::nil(),
            version: 4,
        };
        let (job_type, payload) = job.into_parts().unwrap();
        assert_eq!(job_type, "proposal.updated");
        assert_eq!(payload, json!({"proposalId": Uuid::nil(), "version": 4}));
        assert_eq!(Job::from_parts(&job_type, &payload).unwrap(), job);
    }

    #[test]
    fn test_unknown_job_type_is_rejected() {
        let result = Job::from_parts("report.generate", &json!({}));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_idempotency_key_is_stable() {
        let tenant = Some(Uuid::new_v4());
        let payload = json!({"prefix": "x"});
        let a = idempotency_key("cache.invalidate", tenant, &payload);
        let b = idempotency_key("cache.invalidate", tenant, &payload);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, idempotency_key("cache.invalidate", None, &payload));
    }

    #[test]
    fn test_notification_audience() {
        assert_eq!(notification_audience(ProposalStatus::InReview), Some("approvers"));
        assert_eq!(notification_audience(ProposalStatus::Rejected), Some("author"));
        assert_eq!(notification_audience(ProposalStatus::Draft), None);
    }

    #[tokio::test]
    async fn test_cache_invalidate_job() {
        let cache = Arc::new(CacheService::new(Duration::from_secs(60)));
        let tenant = Uuid::new_v4();
        cache.set(format!("{}:products:list", tenant), json!([])).await;
        cache.set(format!("{}:dashboard:stats", tenant), json!({})).await;

        let job = stored(
            &Job::CacheInvalidate {
                prefix: format!("{}:products:", tenant),
            },
            Some(tenant),
        );
        executor(cache.clone()).execute(&job).await.unwrap();

        assert_eq!(cache.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn test_cache_invalidate_outside_tenant_fails() {
        let cache = Arc::new(CacheService::new(Duration::from_secs(60)));
        let job = stored(
            &Job::CacheInvalidate {
                prefix: "someone-else:".to_string(),
            },
            Some(Uuid::new_v4()),
        );
        let result = executor(cache).execute(&job).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_proposal_updated_invalidates_dashboard() {
        let cache = Arc::new(CacheService::new(Duration::from_secs(60)));
        let tenant = Uuid::new_v4();
        cache.set(format!("{}:dashboard:stats", tenant), json!({})).await;
        cache.set(format!("{}:products:list", tenant), json!([])).await;

        let job = stored(
            &Job::ProposalUpdated {
                proposal_id: Uuid::new_v4(),
                version: 2,
            },
            Some(tenant),
        );
        executor(cache.clone()).execute(&job).await.unwrap();

        assert!(cache.get(&format!("{}:dashboard:stats", tenant)).await.is_none());
        assert!(cache.get(&format!("{}:products:list", tenant)).await.is_some());
    }

    #[tokio::test]
    async fn test_email_without_tenant_needs_no_database() {
        let cache = Arc::new(CacheService::new(Duration::from_secs(60)));
        let ok = stored(
            &Job::NotificationEmail {
                to: "buyer@globex.test".into(),
                subject: "Your proposal".into(),
                body: "See attached".into(),
            },
            None,
        );
        let bad = stored(
            &Job::NotificationEmail {
                to: "nobody".into(),
                subject: "x".into(),
                body: "y".into(),
            },
            None,
        );
        let executor = executor(cache);
        assert!(executor.execute(&ok).await.is_ok());
        assert!(executor.execute(&bad).await.is_err());
    }
}
