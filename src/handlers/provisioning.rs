//! # Provisioning API Handlers
//!
//! Bulk provisioning across an employee × provider cross product, and the
//! single-account path for one employee.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Actor, ActorHeader, OperatorAuth};
use crate::error::{ApiError, validation_error};
use crate::handlers::types::parse_uuid;
use crate::models::ProviderTag;
use crate::models::workflow_request::{BatchSummary, FailedUnit, WorkflowStatus};
use crate::provisioner::{UnitSuccess, dedup};
use crate::server::AppState;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkProvisionRequest {
    pub employee_ids: Option<Vec<Uuid>>,
    pub providers: Option<Vec<ProviderTag>>,
    /// Requester recorded on the batch's workflow request; defaults to the
    /// `X-Actor-Id` user
    pub requester_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkProvisionResponse {
    pub results: Vec<UnitSuccess>,
    pub errors: Vec<FailedUnit>,
    pub summary: BatchSummary,
    /// `bulk_onboarding` request recording this batch
    pub workflow_request_id: Uuid,
    /// `completed`, `partial_success` or `failed`
    pub status: WorkflowStatus,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateAccountRequest {
    pub provider: ProviderTag,
}

/// Provision accounts for every employee at every provider
#[utoipa::path(
    post,
    path = "/provisioning/bulk",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = BulkProvisionRequest,
    responses(
        (status = 200, description = "Batch executed; per-unit failures are in errors", body = BulkProvisionResponse, example = json!({
            "results": [
                {
                    "employeeId": "550e8400-e29b-41d4-a716-446655440000",
                    "provider": "google",
                    "accountId": "ada@example.com",
                    "providerAccountId": "7d0f1f1e-8f0a-4a59-9a55-0f4d6b7f1c11"
                }
            ],
            "errors": [
                {
                    "employeeId": "550e8400-e29b-41d4-a716-446655440000",
                    "provider": "slack",
                    "code": "PROVIDER_ERROR",
                    "message": "provider error: [rate_limited] slow down"
                }
            ],
            "summary": {
                "totalOperations": 2,
                "successCount": 1,
                "errorCount": 1,
                "successRate": "50.0%"
            },
            "workflowRequestId": "0c7b7d8e-2a43-4f6c-9a4a-7b2f3c1d5e6f",
            "status": "partial_success"
        })),
        (status = 400, description = "Missing or empty employeeIds or providers", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Database, audit or integrity failure", body = ApiError)
    ),
    tag = "provisioning"
)]
pub async fn bulk_provision(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    payload: Result<Json<BulkProvisionRequest>, JsonRejection>,
) -> Result<Json<BulkProvisionResponse>, ApiError> {
    let Json(request) = payload?;

    // The stored batch inputs must match what the summary counts.
    let employee_ids = dedup(&request.employee_ids.unwrap_or_default());
    let providers = dedup(&request.providers.unwrap_or_default());
    if employee_ids.is_empty() || providers.is_empty() {
        return Err(validation_error(
            "employeeIds and providers are required",
            serde_json::json!({
                "employeeIds": if employee_ids.is_empty() { "must not be empty" } else { "ok" },
                "providers": if providers.is_empty() { "must not be empty" } else { "ok" },
            }),
        ));
    }
    let requester_id = request.requester_id.or(actor.user_id()).ok_or_else(|| {
        validation_error(
            "A requester is required",
            serde_json::json!({ "requesterId": "Provide requesterId or the X-Actor-Id header" }),
        )
    })?;

    let batch = state
        .provisioner
        .provision(&employee_ids, &providers, &actor.audit_id())
        .await?;

    let workflow = state
        .engine
        .record_bulk_outcome(
            requester_id,
            employee_ids,
            providers,
            batch.summary.clone(),
            batch.errors.clone(),
        )
        .await?;

    Ok(Json(BulkProvisionResponse {
        results: batch.results,
        errors: batch.errors,
        summary: batch.summary,
        workflow_request_id: workflow.id,
        status: workflow.status,
    }))
}

/// Create one account for an employee at a provider
#[utoipa::path(
    post,
    path = "/employees/{id}/accounts",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Employee UUID")
    ),
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = UnitSuccess),
        (status = 400, description = "Invalid input or terminated employee", body = ApiError),
        (status = 404, description = "Employee not found", body = ApiError),
        (status = 409, description = "Account already exists", body = ApiError),
        (status = 412, description = "Provider not configured", body = ApiError),
        (status = 502, description = "Provider call failed", body = ApiError)
    ),
    tag = "provisioning"
)]
pub async fn create_account(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UnitSuccess>), ApiError> {
    let employee_id = parse_uuid(&id, "id")?;
    let Json(request) = payload?;

    let created = state
        .provisioner
        .provision_one(employee_id, request.provider, &actor.audit_id())
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}
