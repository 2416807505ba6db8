//! Workflow request entity model
//!
//! A workflow request is the approval unit. Its `data` column is a typed
//! payload keyed by the request type and validated when the row is written.

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use super::provider::ProviderTag;

/// Kind of change a workflow request asks for
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    #[sea_orm(string_value = "user_create")]
    UserCreate,
    #[sea_orm(string_value = "user_delete")]
    UserDelete,
    #[sea_orm(string_value = "permission_change")]
    PermissionChange,
    #[sea_orm(string_value = "saas_access")]
    SaasAccess,
    #[sea_orm(string_value = "bulk_onboarding")]
    BulkOnboarding,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::UserCreate => "user_create",
            WorkflowType::UserDelete => "user_delete",
            WorkflowType::PermissionChange => "permission_change",
            WorkflowType::SaasAccess => "saas_access",
            WorkflowType::BulkOnboarding => "bulk_onboarding",
        }
    }
}

/// Position of a request in its lifecycle
///
/// `pending` and `in_review` both mean "awaiting approver action".
/// `rejected`, `completed`, `partial_success` and `failed` are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_review")]
    InReview,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "partial_success")]
    PartialSuccess,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InReview => "in_review",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::PartialSuccess => "partial_success",
            WorkflowStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Rejected
                | WorkflowStatus::Completed
                | WorkflowStatus::PartialSuccess
                | WorkflowStatus::Failed
        )
    }

    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self, WorkflowStatus::Pending | WorkflowStatus::InReview)
    }

    /// Terminal status for an executed batch: `completed` when nothing failed,
    /// `partial_success` when some units succeeded, `failed` otherwise.
    pub fn from_outcome(success_count: u32, error_count: u32) -> Self {
        if error_count == 0 {
            WorkflowStatus::Completed
        } else if success_count > 0 {
            WorkflowStatus::PartialSuccess
        } else {
            WorkflowStatus::Failed
        }
    }
}

/// Aggregate counters for one batch execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_operations: u32,
    pub success_count: u32,
    pub error_count: u32,
    /// Success ratio rendered with one decimal, e.g. `"50.0%"`
    pub success_rate: String,
}

impl BatchSummary {
    pub fn new(total_operations: u32, success_count: u32, error_count: u32) -> Self {
        let rate = if total_operations == 0 {
            0.0
        } else {
            f64::from(success_count) * 100.0 / f64::from(total_operations)
        };
        Self {
            total_operations,
            success_count,
            error_count,
            success_rate: format!("{:.1}%", rate),
        }
    }
}

/// One failed `(employee, provider)` unit, detailed enough to retry just it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedUnit {
    pub employee_id: Uuid,
    pub provider: ProviderTag,
    /// Error classification, e.g. `ALREADY_EXISTS` or `PROVIDER_ERROR`
    pub code: String,
    pub message: String,
}

/// Typed request payload, tagged by workflow type
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum WorkflowPayload {
    UserCreate {
        #[serde(default)]
        providers: Vec<ProviderTag>,
        #[serde(default)]
        notes: Option<String>,
    },
    UserDelete {
        #[serde(default)]
        providers: Vec<ProviderTag>,
        #[serde(default)]
        reason: Option<String>,
    },
    PermissionChange {
        provider: ProviderTag,
        permission: String,
        #[serde(default = "default_grant")]
        grant: bool,
    },
    SaasAccess {
        provider: ProviderTag,
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        justification: Option<String>,
    },
    BulkOnboarding {
        employee_ids: Vec<Uuid>,
        providers: Vec<ProviderTag>,
        #[serde(default)]
        summary: Option<BatchSummary>,
        #[serde(default)]
        failures: Vec<FailedUnit>,
    },
}

fn default_grant() -> bool {
    true
}

impl WorkflowPayload {
    pub fn request_type(&self) -> WorkflowType {
        match self {
            WorkflowPayload::UserCreate { .. } => WorkflowType::UserCreate,
            WorkflowPayload::UserDelete { .. } => WorkflowType::UserDelete,
            WorkflowPayload::PermissionChange { .. } => WorkflowType::PermissionChange,
            WorkflowPayload::SaasAccess { .. } => WorkflowType::SaasAccess,
            WorkflowPayload::BulkOnboarding { .. } => WorkflowType::BulkOnboarding,
        }
    }

    /// Builds a typed payload for `request_type` from an untyped JSON body.
    ///
    /// `null` is treated as an empty object. A `type` field inside the body
    /// must agree with `request_type` when present.
    pub fn from_json(request_type: WorkflowType, data: JsonValue) -> Result<Self, String> {
        let mut object = match data {
            JsonValue::Null => serde_json::Map::new(),
            JsonValue::Object(map) => map,
            _ => return Err("data must be a JSON object".to_string()),
        };

        if let Some(tag) = object.get("type") {
            if tag.as_str() != Some(request_type.as_str()) {
                return Err(format!(
                    "data.type {} does not match request type '{}'",
                    tag,
                    request_type.as_str()
                ));
            }
        }
        object.insert(
            "type".to_string(),
            JsonValue::String(request_type.as_str().to_string()),
        );

        let payload: WorkflowPayload = serde_json::from_value(JsonValue::Object(object))
            .map_err(|e| format!("invalid {} payload: {}", request_type.as_str(), e))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            WorkflowPayload::PermissionChange { permission, .. } if permission.trim().is_empty() => {
                Err("permission must not be empty".to_string())
            }
            WorkflowPayload::BulkOnboarding {
                employee_ids,
                providers,
                ..
            } if employee_ids.is_empty() || providers.is_empty() => {
                Err("bulk onboarding requires employees and providers".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Outcome reported by whoever executed an approved request
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub success_count: u32,
    pub error_count: u32,
    #[serde(default)]
    pub failures: Vec<FailedUnit>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExecutionReport {
    pub fn terminal_status(&self) -> WorkflowStatus {
        WorkflowStatus::from_outcome(self.success_count, self.error_count)
    }
}

/// Workflow request entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "workflow_requests")]
pub struct Model {
    /// Unique identifier for the request (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub request_type: WorkflowType,

    /// User who submitted the request
    pub requester_id: Uuid,

    /// Employee the request is about (representative id for batches)
    pub target_user_id: Uuid,

    pub status: WorkflowStatus,

    #[sea_orm(column_type = "JsonBinary")]
    pub data: WorkflowPayload,

    /// Attached when the request leaves `in_progress`
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub execution_report: Option<ExecutionReport>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::approval::Entity")]
    Approvals,
}

impl Related<super::approval::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Approvals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_batch_outcomes() {
        assert_eq!(WorkflowStatus::from_outcome(4, 0), WorkflowStatus::Completed);
        assert_eq!(
            WorkflowStatus::from_outcome(1, 1),
            WorkflowStatus::PartialSuccess
        );
        assert_eq!(WorkflowStatus::from_outcome(0, 4), WorkflowStatus::Failed);
    }

    #[test]
    fn summary_renders_one_decimal_rate() {
        assert_eq!(BatchSummary::new(2, 1, 1).success_rate, "50.0%");
        assert_eq!(BatchSummary::new(3, 1, 2).success_rate, "33.3%");
        assert_eq!(BatchSummary::new(4, 4, 0).success_rate, "100.0%");
    }

    #[test]
    fn payload_is_tagged_from_request_type() {
        let payload = WorkflowPayload::from_json(
            WorkflowType::SaasAccess,
            json!({ "provider": "github", "role": "maintainer" }),
        )
        .unwrap();
        assert_eq!(payload.request_type(), WorkflowType::SaasAccess);
        assert!(matches!(
            payload,
            WorkflowPayload::SaasAccess {
                provider: ProviderTag::Github,
                ..
            }
        ));
    }

    #[test]
    fn payload_accepts_null_for_types_without_required_fields() {
        let payload = WorkflowPayload::from_json(WorkflowType::UserCreate, JsonValue::Null).unwrap();
        assert_eq!(
            payload,
            WorkflowPayload::UserCreate {
                providers: vec![],
                notes: None
            }
        );
    }

    #[test]
    fn wire_shapes_use_camel_case() {
        let summary = serde_json::to_value(BatchSummary::new(2, 1, 1)).unwrap();
        assert_eq!(summary["totalOperations"], 2);
        assert_eq!(summary["successRate"], "50.0%");

        let payload = WorkflowPayload::from_json(
            WorkflowType::PermissionChange,
            json!({ "provider": "slack", "permission": "admin" }),
        )
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "permission_change");
        assert_eq!(value["grant"], true);
    }

    #[test]
    fn payload_rejects_mismatched_tag_and_missing_fields() {
        assert!(
            WorkflowPayload::from_json(
                WorkflowType::UserDelete,
                json!({ "type": "user_create" })
            )
            .is_err()
        );
        assert!(WorkflowPayload::from_json(WorkflowType::PermissionChange, json!({})).is_err());
        assert!(
            WorkflowPayload::from_json(
                WorkflowType::BulkOnboarding,
                json!({ "employeeIds": [], "providers": ["slack"] })
            )
            .is_err()
        );
        assert!(WorkflowPayload::from_json(WorkflowType::UserCreate, json!([1, 2])).is_err());
    }
}
