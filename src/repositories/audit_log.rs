//! Audit log repository
//!
//! Insert and read only; there is deliberately no update or delete.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::audit_log::{self, Entity as AuditLog};

#[derive(Debug, Clone, Default)]
pub struct AuditListFilter {
    pub action: Option<String>,
    pub actor: Option<String>,
    pub resource: Option<String>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    db: DatabaseConnection,
}

impl AuditLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn append<C>(
        conn: &C,
        user_id: &str,
        action: &str,
        resource: &str,
        metadata: JsonValue,
    ) -> Result<audit_log::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let model = audit_log::Model {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            metadata,
            timestamp: Utc::now().fixed_offset(),
        };

        let active = audit_log::ActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id.clone()),
            action: Set(model.action.clone()),
            resource: Set(model.resource.clone()),
            metadata: Set(model.metadata.clone()),
            timestamp: Set(model.timestamp),
        };
        AuditLog::insert(active).exec_without_returning(conn).await?;

        Ok(model)
    }

    /// Newest first, with the total matching count
    pub async fn list(
        &self,
        filter: &AuditListFilter,
    ) -> Result<(Vec<audit_log::Model>, u64), DbErr> {
        let mut query = AuditLog::find();
        if let Some(action) = &filter.action {
            query = query.filter(audit_log::Column::Action.eq(action.as_str()));
        }
        if let Some(actor) = &filter.actor {
            query = query.filter(audit_log::Column::UserId.eq(actor.as_str()));
        }
        if let Some(resource) = &filter.resource {
            query = query.filter(audit_log::Column::Resource.eq(resource.as_str()));
        }

        let total = query.clone().count(&self.db).await?;
        let entries = query
            .order_by_desc(audit_log::Column::Timestamp)
            .order_by_desc(audit_log::Column::Id)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.db)
            .await?;
        Ok((entries, total))
    }
}
