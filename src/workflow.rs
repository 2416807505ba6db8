//! Workflow engine
//!
//! Owns the workflow request lifecycle:
//!
//! ```text
//! pending -> in_review -> approved -> in_progress -> completed
//!        \            \-> rejected              \-> partial_success
//!         \-> approved (no approvers)            \-> failed
//! ```
//!
//! Every status change is a conditional update inside a transaction that
//! also appends its audit entry. Approval decisions first take a row lock on
//! the request, so two approvers deciding at once are applied one after the
//! other and only one of them can observe "all approved".

use std::collections::HashSet;

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, resource_ref};
use crate::error::EngineError;
use crate::models::ProviderTag;
use crate::models::approval::{self, ApprovalStatus};
use crate::models::workflow_request::{
    self, BatchSummary, ExecutionReport, FailedUnit, WorkflowPayload, WorkflowStatus, WorkflowType,
};
use crate::repositories::{ApprovalRepository, WorkflowListFilter, WorkflowRequestRepository};
use crate::telemetry;

const RESOURCE: &str = "workflow_request";
pub const MAX_PAGE_SIZE: u64 = 100;

/// Approver decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[serde(alias = "approved")]
    Approve,
    #[serde(alias = "rejected")]
    Reject,
}

impl From<Decision> for ApprovalStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// Input for [`WorkflowEngine::create`]; optional fields are checked there
#[derive(Debug, Clone, Default)]
pub struct NewWorkflowRequest {
    pub request_type: Option<WorkflowType>,
    pub requester_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub data: JsonValue,
    pub approver_ids: Vec<Uuid>,
}

/// A request together with its approver assignments
#[derive(Debug, Clone)]
pub struct WorkflowDetail {
    pub request: workflow_request::Model,
    pub approvals: Vec<approval::Model>,
}

#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    db: DatabaseConnection,
    requests: WorkflowRequestRepository,
}

impl WorkflowEngine {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            requests: WorkflowRequestRepository::new(db.clone()),
            db,
        }
    }

    /// Create a request in `pending` with one pending approval per approver.
    ///
    /// A request with no approvers is approved on creation and the
    /// auto-approval is audited as its own entry.
    pub async fn create(&self, new: NewWorkflowRequest) -> Result<WorkflowDetail, EngineError> {
        let request_type = new
            .request_type
            .ok_or_else(|| EngineError::Validation("type is required".to_string()))?;
        let requester_id = new
            .requester_id
            .ok_or_else(|| EngineError::Validation("requesterId is required".to_string()))?;
        let target_user_id = new
            .target_user_id
            .ok_or_else(|| EngineError::Validation("targetUserId is required".to_string()))?;
        let payload =
            WorkflowPayload::from_json(request_type, new.data).map_err(EngineError::Validation)?;

        let mut approver_ids = new.approver_ids;
        let mut seen = HashSet::new();
        approver_ids.retain(|id| seen.insert(*id));

        let txn = self.db.begin().await?;
        let (request, approvals) =
            Self::create_in(&txn, requester_id, target_user_id, payload, &approver_ids).await?;
        txn.commit().await?;

        tracing::info!(
            workflow_id = %request.id,
            request_type = request.request_type.as_str(),
            approvers = approvals.len(),
            status = request.status.as_str(),
            "Workflow request created"
        );

        Ok(WorkflowDetail { request, approvals })
    }

    async fn create_in<C>(
        conn: &C,
        requester_id: Uuid,
        target_user_id: Uuid,
        payload: WorkflowPayload,
        approver_ids: &[Uuid],
    ) -> Result<(workflow_request::Model, Vec<approval::Model>), EngineError>
    where
        C: ConnectionTrait,
    {
        let mut request =
            WorkflowRequestRepository::insert(conn, requester_id, target_user_id, payload).await?;
        let approvals = ApprovalRepository::assign(conn, request.id, approver_ids).await?;

        let actor = requester_id.to_string();
        AuditRecorder::record(
            conn,
            &actor,
            audit::WORKFLOW_CREATED,
            &resource_ref(RESOURCE, request.id),
            json!({
                "type": request.request_type.as_str(),
                "target_user_id": target_user_id,
                "approver_ids": approver_ids,
            }),
        )
        .await?;

        if approver_ids.is_empty() {
            apply_transition(
                conn,
                request.id,
                WorkflowStatus::Pending,
                WorkflowStatus::Approved,
                &actor,
                audit::WORKFLOW_AUTO_APPROVED,
                json!({ "reason": "no approvers assigned" }),
            )
            .await?;
            request.status = WorkflowStatus::Approved;
        }

        Ok((request, approvals))
    }

    /// Record one approver's decision and re-evaluate the request.
    ///
    /// A rejection moves the request to `rejected` at once. An approval moves
    /// it to `approved` when no assignment is left pending, otherwise to
    /// `in_review`.
    pub async fn record_approval(
        &self,
        request_id: Uuid,
        approver_id: Uuid,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<WorkflowDetail, EngineError> {
        let comment = comment.filter(|c| !c.trim().is_empty());
        let txn = self.db.begin().await?;

        if WorkflowRequestRepository::lock_awaiting_approval(&txn, request_id).await? == 0 {
            return Err(
                match WorkflowRequestRepository::find_by_id(&txn, request_id).await? {
                    None => EngineError::not_found(RESOURCE, request_id),
                    Some(existing) => EngineError::InvalidState(format!(
                        "workflow request {} is {} and no longer accepts approvals",
                        request_id,
                        existing.status.as_str()
                    )),
                },
            );
        }

        let request = WorkflowRequestRepository::find_by_id(&txn, request_id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, request_id))?;

        let decided = ApprovalRepository::decide(
            &txn,
            request_id,
            approver_id,
            decision.into(),
            comment.clone(),
        )
        .await?;
        if decided == 0 {
            return Err(
                match ApprovalRepository::find(&txn, request_id, approver_id).await? {
                    None => EngineError::not_found(
                        "approval",
                        format!("{}/{}", request_id, approver_id),
                    ),
                    Some(existing) => EngineError::InvalidState(format!(
                        "approver {} already {} request {}",
                        approver_id,
                        existing.status.as_str(),
                        request_id
                    )),
                },
            );
        }

        let actor = approver_id.to_string();
        let resource = resource_ref(RESOURCE, request_id);
        AuditRecorder::record(
            &txn,
            &actor,
            audit::APPROVAL_RECORDED,
            &resource,
            json!({
                "approver_id": approver_id,
                "decision": ApprovalStatus::from(decision).as_str(),
                "comment": comment,
            }),
        )
        .await?;

        let next = match decision {
            Decision::Reject => Some(WorkflowStatus::Rejected),
            Decision::Approve => {
                let pending =
                    ApprovalRepository::count_with_status(&txn, request_id, ApprovalStatus::Pending)
                        .await?;
                if pending == 0 {
                    Some(WorkflowStatus::Approved)
                } else if request.status == WorkflowStatus::Pending {
                    Some(WorkflowStatus::InReview)
                } else {
                    None
                }
            }
        };

        if let Some(to) = next {
            apply_transition(
                &txn,
                request_id,
                request.status,
                to,
                &actor,
                audit::WORKFLOW_STATUS_CHANGED,
                json!({ "approver_id": approver_id }),
            )
            .await?;
        }

        txn.commit().await?;

        tracing::info!(
            workflow_id = %request_id,
            approver_id = %approver_id,
            decision = ApprovalStatus::from(decision).as_str(),
            "Approval recorded"
        );

        self.get(request_id).await
    }

    /// Move an `approved` request to `in_progress`, and an `in_progress`
    /// request to its terminal status once `report` is supplied. Both steps
    /// happen in one call when an approved request comes with a report.
    pub async fn advance(
        &self,
        request_id: Uuid,
        actor: &str,
        report: Option<ExecutionReport>,
    ) -> Result<workflow_request::Model, EngineError> {
        let txn = self.db.begin().await?;
        let request = WorkflowRequestRepository::find_by_id(&txn, request_id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, request_id))?;
        let request = Self::advance_in(&txn, request, actor, report).await?;
        txn.commit().await?;
        Ok(request)
    }

    async fn advance_in<C>(
        conn: &C,
        request: workflow_request::Model,
        actor: &str,
        report: Option<ExecutionReport>,
    ) -> Result<workflow_request::Model, EngineError>
    where
        C: ConnectionTrait,
    {
        let request_id = request.id;
        let started = match request.status {
            WorkflowStatus::Approved => {
                apply_transition(
                    conn,
                    request_id,
                    WorkflowStatus::Approved,
                    WorkflowStatus::InProgress,
                    actor,
                    audit::WORKFLOW_STATUS_CHANGED,
                    JsonValue::Null,
                )
                .await?;
                true
            }
            WorkflowStatus::InProgress => false,
            other => {
                return Err(EngineError::InvalidState(format!(
                    "workflow request {} is {}; only approved or in_progress requests advance",
                    request_id,
                    other.as_str()
                )));
            }
        };

        match report {
            Some(report) => {
                if report.failures.len() > report.error_count as usize {
                    return Err(EngineError::Validation(
                        "execution report lists more failures than errorCount".to_string(),
                    ));
                }
                let to = report.terminal_status();
                apply_transition(
                    conn,
                    request_id,
                    WorkflowStatus::InProgress,
                    to,
                    actor,
                    audit::WORKFLOW_STATUS_CHANGED,
                    json!({
                        "success_count": report.success_count,
                        "error_count": report.error_count,
                    }),
                )
                .await?;

                let current = WorkflowRequestRepository::find_by_id(conn, request_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(RESOURCE, request_id))?;
                Ok(WorkflowRequestRepository::attach_report(conn, current, report).await?)
            }
            None if started => WorkflowRequestRepository::find_by_id(conn, request_id)
                .await?
                .ok_or_else(|| EngineError::not_found(RESOURCE, request_id)),
            None => Err(EngineError::Validation(
                "an execution report is required to complete an in_progress request".to_string(),
            )),
        }
    }

    /// Persist one bulk provisioning batch as a `bulk_onboarding` request.
    ///
    /// The request has no approvers: it is created, auto-approved, started
    /// and resolved to `completed`, `partial_success` or `failed` in a single
    /// transaction.
    pub async fn record_bulk_outcome(
        &self,
        requester_id: Uuid,
        employee_ids: Vec<Uuid>,
        providers: Vec<ProviderTag>,
        summary: BatchSummary,
        failures: Vec<FailedUnit>,
    ) -> Result<workflow_request::Model, EngineError> {
        let target_user_id = employee_ids
            .first()
            .copied()
            .ok_or_else(|| EngineError::Validation("employeeIds must not be empty".to_string()))?;

        let report = ExecutionReport {
            success_count: summary.success_count,
            error_count: summary.error_count,
            failures: failures.clone(),
            notes: None,
        };
        let payload = WorkflowPayload::BulkOnboarding {
            employee_ids,
            providers,
            summary: Some(summary),
            failures,
        };
        payload.validate().map_err(EngineError::Validation)?;

        let txn = self.db.begin().await?;
        let (request, _) = Self::create_in(&txn, requester_id, target_user_id, payload, &[]).await?;
        let request =
            Self::advance_in(&txn, request, &requester_id.to_string(), Some(report)).await?;
        txn.commit().await?;

        tracing::info!(
            workflow_id = %request.id,
            status = request.status.as_str(),
            "Bulk onboarding batch recorded"
        );

        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<WorkflowDetail, EngineError> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, request_id))?;
        let approvals = ApprovalRepository::list_for_request(&self.db, request_id).await?;
        Ok(WorkflowDetail { request, approvals })
    }

    pub async fn list(
        &self,
        filter: WorkflowListFilter,
    ) -> Result<(Vec<workflow_request::Model>, u64), EngineError> {
        if filter.limit == 0 || filter.limit > MAX_PAGE_SIZE {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(self.requests.list(&filter).await?)
    }
}

/// Conditionally move `request_id` from `from` to `to` and audit it.
async fn apply_transition<C>(
    conn: &C,
    request_id: Uuid,
    from: WorkflowStatus,
    to: WorkflowStatus,
    actor: &str,
    action: &str,
    extra: JsonValue,
) -> Result<(), EngineError>
where
    C: ConnectionTrait,
{
    let changed = WorkflowRequestRepository::transition(conn, request_id, &[from], to).await?;
    if changed == 0 {
        return Err(EngineError::InvalidState(format!(
            "workflow request {} is no longer {}",
            request_id,
            from.as_str()
        )));
    }

    let mut metadata = json!({ "from": from.as_str(), "to": to.as_str() });
    if let (Some(target), JsonValue::Object(fields)) = (metadata.as_object_mut(), extra) {
        target.extend(fields);
    }
    AuditRecorder::record(
        conn,
        actor,
        action,
        &resource_ref(RESOURCE, request_id),
        metadata,
    )
    .await?;

    telemetry::record_transition(to);
    tracing::info!(
        workflow_id = %request_id,
        from = from.as_str(),
        status = to.as_str(),
        "Workflow request transitioned"
    );
    Ok(())
}
