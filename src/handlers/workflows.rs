//! # Workflow API Handlers
//!
//! Create, query, approve and advance workflow requests.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{Actor, ActorHeader, OperatorAuth};
use crate::error::{ApiError, validation_error};
use crate::handlers::types::{ApprovalView, PageInfo, PageQuery, WorkflowView, parse_uuid};
use crate::models::workflow_request::{ExecutionReport, WorkflowStatus, WorkflowType};
use crate::repositories::WorkflowListFilter;
use crate::server::AppState;
use crate::workflow::{Decision, NewWorkflowRequest, WorkflowDetail};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    #[serde(rename = "type")]
    pub request_type: Option<WorkflowType>,
    /// Defaults to the `X-Actor-Id` user
    pub requester_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    /// Type-specific payload
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub approver_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowDetailResponse {
    pub request: WorkflowView,
    pub approvals: Vec<ApprovalView>,
}

impl From<WorkflowDetail> for WorkflowDetailResponse {
    fn from(detail: WorkflowDetail) -> Self {
        Self {
            request: detail.request.into(),
            approvals: detail.approvals.into_iter().map(ApprovalView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowsResponse {
    pub workflows: Vec<WorkflowView>,
    pub page: PageInfo,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListWorkflowsQuery {
    pub status: Option<WorkflowStatus>,
    #[serde(rename = "type")]
    #[param(rename = "type")]
    pub request_type: Option<WorkflowType>,
    pub requester_id: Option<Uuid>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub approver_id: Option<Uuid>,
    pub decision: Decision,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    /// Required to leave `in_progress`
    pub execution_report: Option<ExecutionReport>,
}

/// Create a workflow request
#[utoipa::path(
    post,
    path = "/workflows",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Request created (approved at once when it has no approvers)", body = WorkflowDetailResponse),
        (status = 400, description = "Missing type, requester or target, or invalid data", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    payload: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowDetailResponse>), ApiError> {
    let Json(request) = payload?;

    let detail = state
        .engine
        .create(NewWorkflowRequest {
            request_type: request.request_type,
            requester_id: request.requester_id.or(actor.user_id()),
            target_user_id: request.target_user_id,
            data: request.data,
            approver_ids: request.approver_ids,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(detail.into())))
}

/// List workflow requests, newest first
#[utoipa::path(
    get,
    path = "/workflows",
    security(("bearer_auth" = [])),
    params(ActorHeader, ListWorkflowsQuery),
    responses(
        (status = 200, description = "Page of workflow requests", body = WorkflowsResponse),
        (status = 400, description = "Invalid filter or page size", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(query): Query<ListWorkflowsQuery>,
) -> Result<Json<WorkflowsResponse>, ApiError> {
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = (page.limit(), page.offset());

    let (workflows, total) = state
        .engine
        .list(WorkflowListFilter {
            status: query.status,
            request_type: query.request_type,
            requester_id: query.requester_id,
            limit,
            offset,
        })
        .await?;

    Ok(Json(WorkflowsResponse {
        workflows: workflows.into_iter().map(WorkflowView::from).collect(),
        page: PageInfo::new(total, limit, offset),
    }))
}

/// Get a workflow request with its approvals
#[utoipa::path(
    get,
    path = "/workflows/{id}",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Workflow request UUID")
    ),
    responses(
        (status = 200, description = "Workflow request", body = WorkflowDetailResponse),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDetailResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    Ok(Json(state.engine.get(id).await?.into()))
}

/// Record an approver's decision
#[utoipa::path(
    post,
    path = "/workflows/{id}/approvals",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Workflow request UUID")
    ),
    request_body = ApprovalRequest,
    responses(
        (status = 200, description = "Decision recorded; returns the updated request", body = WorkflowDetailResponse),
        (status = 400, description = "Invalid decision", body = ApiError),
        (status = 404, description = "Request or approver assignment not found", body = ApiError),
        (status = 409, description = "Request no longer awaiting approval, or approver already decided", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn record_approval(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Json<WorkflowDetailResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let Json(request) = payload?;

    let approver_id = request.approver_id.or(actor.user_id()).ok_or_else(|| {
        validation_error(
            "An approver is required",
            serde_json::json!({ "approverId": "Provide approverId or the X-Actor-Id header" }),
        )
    })?;

    let detail = state
        .engine
        .record_approval(id, approver_id, request.decision, request.comment)
        .await?;
    Ok(Json(detail.into()))
}

/// Advance an approved or in-progress request
#[utoipa::path(
    post,
    path = "/workflows/{id}/advance",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Workflow request UUID")
    ),
    request_body = AdvanceRequest,
    responses(
        (status = 200, description = "Request advanced", body = WorkflowView),
        (status = 400, description = "Execution report missing or inconsistent", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Request is not approved or in progress", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn advance_workflow(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
    payload: Option<Json<AdvanceRequest>>,
) -> Result<Json<WorkflowView>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let request = payload.map(|Json(body)| body).unwrap_or_default();

    let advanced = state
        .engine
        .advance(id, &actor.audit_id(), request.execution_report)
        .await?;
    Ok(Json(advanced.into()))
}
