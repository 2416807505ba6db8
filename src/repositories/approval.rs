//! Approval repository

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::models::approval::{self, ApprovalStatus, Entity as Approval};

pub struct ApprovalRepository;

impl ApprovalRepository {
    /// Assign every approver in `approver_ids` as `pending`
    pub async fn assign<C>(
        conn: &C,
        workflow_request_id: Uuid,
        approver_ids: &[Uuid],
    ) -> Result<Vec<approval::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        if approver_ids.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().fixed_offset();
        let models: Vec<approval::Model> = approver_ids
            .iter()
            .map(|approver_id| approval::Model {
                id: Uuid::new_v4(),
                workflow_request_id,
                approver_id: *approver_id,
                status: ApprovalStatus::Pending,
                comment: None,
                decided_at: None,
                created_at: now,
            })
            .collect();

        let rows = models.iter().map(|model| approval::ActiveModel {
            id: Set(model.id),
            workflow_request_id: Set(model.workflow_request_id),
            approver_id: Set(model.approver_id),
            status: Set(model.status),
            comment: Set(None),
            decided_at: Set(None),
            created_at: Set(now),
        });
        Approval::insert_many(rows).exec_without_returning(conn).await?;

        Ok(models)
    }

    pub async fn list_for_request<C>(
        conn: &C,
        workflow_request_id: Uuid,
    ) -> Result<Vec<approval::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        Approval::find()
            .filter(approval::Column::WorkflowRequestId.eq(workflow_request_id))
            .order_by_asc(approval::Column::CreatedAt)
            .order_by_asc(approval::Column::ApproverId)
            .all(conn)
            .await
    }

    pub async fn find<C>(
        conn: &C,
        workflow_request_id: Uuid,
        approver_id: Uuid,
    ) -> Result<Option<approval::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        Approval::find()
            .filter(approval::Column::WorkflowRequestId.eq(workflow_request_id))
            .filter(approval::Column::ApproverId.eq(approver_id))
            .one(conn)
            .await
    }

    /// Record a decision on a still-pending assignment; returns rows changed
    pub async fn decide<C>(
        conn: &C,
        workflow_request_id: Uuid,
        approver_id: Uuid,
        decision: ApprovalStatus,
        comment: Option<String>,
    ) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = Approval::update_many()
            .col_expr(approval::Column::Status, Expr::value(decision.as_str()))
            .col_expr(approval::Column::Comment, Expr::value(comment))
            .col_expr(
                approval::Column::DecidedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(approval::Column::WorkflowRequestId.eq(workflow_request_id))
            .filter(approval::Column::ApproverId.eq(approver_id))
            .filter(approval::Column::Status.eq(ApprovalStatus::Pending.as_str()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn count_with_status<C>(
        conn: &C,
        workflow_request_id: Uuid,
        status: ApprovalStatus,
    ) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        Approval::find()
            .filter(approval::Column::WorkflowRequestId.eq(workflow_request_id))
            .filter(approval::Column::Status.eq(status.as_str()))
            .count(conn)
            .await
    }
}
