//! Approval entity model
//!
//! One row per assigned approver of a workflow request.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Approver assignment and decision
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "approvals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub workflow_request_id: Uuid,

    pub approver_id: Uuid,

    pub status: ApprovalStatus,

    /// Optional reviewer comment recorded with the decision
    pub comment: Option<String>,

    /// When the decision was recorded; `None` while pending
    pub decided_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::workflow_request::Entity",
        from = "Column::WorkflowRequestId",
        to = "super::workflow_request::Column::Id"
    )]
    WorkflowRequest,
}

impl Related<super::workflow_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkflowRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
