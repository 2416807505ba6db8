//! Audit recorder
//!
//! Every state-changing action appends exactly one entry. Append failures
//! surface as [`EngineError::Audit`] and abort the enclosing transaction, so a
//! change is never committed without its entry.

use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::audit_log;
use crate::repositories::{AuditListFilter, AuditLogRepository};

pub const WORKFLOW_CREATED: &str = "workflow.created";
pub const WORKFLOW_AUTO_APPROVED: &str = "workflow.auto_approved";
pub const WORKFLOW_STATUS_CHANGED: &str = "workflow.status_changed";
pub const APPROVAL_RECORDED: &str = "approval.recorded";
pub const ACCOUNT_CREATED: &str = "account.created";
pub const ACCOUNT_DEACTIVATED: &str = "account.deactivated";
pub const SECRET_CREATED: &str = "secret.created";
pub const SECRET_UPDATED: &str = "secret.updated";
pub const SECRET_DELETED: &str = "secret.deleted";
pub const SECRET_ACTIVATED: &str = "secret.activated";
pub const SECRET_ROTATED: &str = "secret.rotated";

pub const MAX_PAGE_SIZE: u64 = 200;

/// `kind:id` resource reference
pub fn resource_ref(kind: &str, id: Uuid) -> String {
    format!("{}:{}", kind, id)
}

/// One page of audit entries
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<audit_log::Model>,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct AuditRecorder {
    repository: AuditLogRepository,
}

impl AuditRecorder {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            repository: AuditLogRepository::new(db),
        }
    }

    /// Append one entry on `conn`, usually the transaction carrying the change.
    pub async fn record<C>(
        conn: &C,
        actor: &str,
        action: &str,
        resource: &str,
        metadata: JsonValue,
    ) -> Result<audit_log::Model, EngineError>
    where
        C: ConnectionTrait,
    {
        let entry = AuditLogRepository::append(conn, actor, action, resource, metadata)
            .await
            .map_err(|err| {
                tracing::error!(action, resource, error = %err, "Audit append failed");
                EngineError::Audit(err)
            })?;

        tracing::debug!(
            audit_id = %entry.id,
            actor,
            action,
            resource,
            "Audit entry recorded"
        );
        Ok(entry)
    }

    /// Newest entries first. An empty log is an empty page.
    pub async fn list(&self, mut filter: AuditListFilter) -> Result<AuditPage, EngineError> {
        if filter.limit == 0 || filter.limit > MAX_PAGE_SIZE {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        filter.action = filter.action.filter(|v| !v.trim().is_empty());
        filter.actor = filter.actor.filter(|v| !v.trim().is_empty());
        filter.resource = filter.resource.filter(|v| !v.trim().is_empty());

        let (entries, total) = self.repository.list(&filter).await?;
        Ok(AuditPage { entries, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ref_format() {
        let id = Uuid::nil();
        assert_eq!(
            resource_ref("workflow_request", id),
            "workflow_request:00000000-0000-0000-0000-000000000000"
        );
    }
}
