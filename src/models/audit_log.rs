//! Audit log entity model
//!
//! Append-only. Nothing in this crate updates or deletes rows.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Actor id recorded for changes not attributable to a user
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Acting user id, or `system`
    pub user_id: String,

    /// Dotted action tag, e.g. `workflow.approved`
    pub action: String,

    /// Resource reference, e.g. `workflow_request:<uuid>`
    pub resource: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: JsonValue,

    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
