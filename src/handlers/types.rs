//! # Common API Types
//!
//! Response views shared by several handlers, plus pagination helpers. Views
//! render timestamps as RFC 3339 strings and never expose ciphertext.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::approval::{self, ApprovalStatus};
use crate::models::provider_account::{self, AccountMetadata, AccountStatus};
use crate::models::workflow_request::{
    self, ExecutionReport, WorkflowPayload, WorkflowStatus, WorkflowType,
};
use crate::models::{ProviderTag, audit_log, secret_bundle};

pub const DEFAULT_PAGE_SIZE: u64 = 50;

fn rfc3339(value: DateTimeWithTimeZone) -> String {
    let utc: DateTime<Utc> = value.naive_utc().and_utc();
    utc.to_rfc3339()
}

/// Offset pagination query shared by list endpoints
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50)
    pub limit: Option<u64>,
    /// Number of items to skip
    pub offset: Option<u64>,
}

impl PageQuery {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

/// Position of a page within the full result set
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

impl PageInfo {
    pub fn new(total: u64, limit: u64, offset: u64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset.saturating_add(limit) < total,
        }
    }
}

/// Parse a path segment as a UUID, reporting which parameter was bad
pub fn parse_uuid(value: &str, name: &str) -> Result<Uuid, ApiError> {
    value.trim().parse::<Uuid>().map_err(|_| {
        crate::error::validation_error(
            "Invalid identifier",
            serde_json::json!({ name: "Must be a valid UUID" }),
        )
    })
}

/// Provider account as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub provider: ProviderTag,
    /// External account id at the provider
    pub account_id: String,
    pub status: AccountStatus,
    pub metadata: AccountMetadata,
    pub created_at: String,
    pub updated_at: String,
}

impl From<provider_account::Model> for AccountView {
    fn from(model: provider_account::Model) -> Self {
        Self {
            id: model.id,
            employee_id: model.employee_id,
            provider: model.provider,
            account_id: model.account_id,
            status: model.status,
            metadata: model.metadata,
            created_at: rfc3339(model.created_at),
            updated_at: rfc3339(model.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub request_type: WorkflowType,
    pub requester_id: Uuid,
    pub target_user_id: Uuid,
    pub status: WorkflowStatus,
    pub data: WorkflowPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_report: Option<ExecutionReport>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<workflow_request::Model> for WorkflowView {
    fn from(model: workflow_request::Model) -> Self {
        Self {
            id: model.id,
            request_type: model.request_type,
            requester_id: model.requester_id,
            target_user_id: model.target_user_id,
            status: model.status,
            data: model.data,
            execution_report: model.execution_report,
            created_at: rfc3339(model.created_at),
            updated_at: rfc3339(model.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub approver_id: Uuid,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub decided_at: Option<String>,
}

impl From<approval::Model> for ApprovalView {
    fn from(model: approval::Model) -> Self {
        Self {
            approver_id: model.approver_id,
            status: model.status,
            comment: model.comment,
            decided_at: model.decided_at.map(rfc3339),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryView {
    pub id: Uuid,
    /// Actor: a user id or `system`
    pub user_id: String,
    pub action: String,
    /// `kind:id` reference to the affected record
    pub resource: String,
    pub metadata: serde_json::Value,
    pub timestamp: String,
}

impl From<audit_log::Model> for AuditEntryView {
    fn from(model: audit_log::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            action: model.action,
            resource: model.resource,
            metadata: model.metadata,
            timestamp: rfc3339(model.timestamp),
        }
    }
}

/// Stored bundle without any credential material
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretBundleView {
    pub id: Uuid,
    pub provider: ProviderTag,
    pub is_active: bool,
    pub has_bot_token: bool,
    pub has_user_token: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<secret_bundle::Model> for SecretBundleView {
    fn from(model: secret_bundle::Model) -> Self {
        Self {
            id: model.id,
            provider: model.provider,
            is_active: model.is_active,
            has_bot_token: model.bot_token.is_some(),
            has_user_token: model.user_token.is_some(),
            created_at: rfc3339(model.created_at),
            updated_at: rfc3339(model.updated_at),
        }
    }
}
