//! # Workflow Request Repository
//!
//! Status changes go through [`WorkflowRequestRepository::transition`], a
//! conditional `UPDATE ... WHERE status IN (...)`. Callers learn from the
//! affected row count whether they won the transition.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::workflow_request::{
    self, Entity as WorkflowRequest, ExecutionReport, WorkflowPayload, WorkflowStatus,
    WorkflowType,
};

/// Filters for listing requests
#[derive(Debug, Clone, Default)]
pub struct WorkflowListFilter {
    pub status: Option<WorkflowStatus>,
    pub request_type: Option<WorkflowType>,
    pub requester_id: Option<Uuid>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct WorkflowRequestRepository {
    db: DatabaseConnection,
}

impl WorkflowRequestRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert<C>(
        conn: &C,
        requester_id: Uuid,
        target_user_id: Uuid,
        data: WorkflowPayload,
    ) -> Result<workflow_request::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();
        let model = workflow_request::Model {
            id: Uuid::new_v4(),
            request_type: data.request_type(),
            requester_id,
            target_user_id,
            status: WorkflowStatus::Pending,
            data,
            execution_report: None,
            created_at: now,
            updated_at: now,
        };

        let active = workflow_request::ActiveModel {
            id: Set(model.id),
            request_type: Set(model.request_type),
            requester_id: Set(requester_id),
            target_user_id: Set(target_user_id),
            status: Set(model.status),
            data: Set(model.data.clone()),
            execution_report: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        WorkflowRequest::insert(active)
            .exec_without_returning(conn)
            .await?;

        Ok(model)
    }

    pub async fn find_by_id<C>(conn: &C, id: Uuid) -> Result<Option<workflow_request::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        WorkflowRequest::find_by_id(id).one(conn).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<workflow_request::Model>, DbErr> {
        Self::find_by_id(&self.db, id).await
    }

    /// Newest first
    pub async fn list(
        &self,
        filter: &WorkflowListFilter,
    ) -> Result<(Vec<workflow_request::Model>, u64), DbErr> {
        let mut query = WorkflowRequest::find();
        if let Some(status) = filter.status {
            query = query.filter(workflow_request::Column::Status.eq(status.as_str()));
        }
        if let Some(request_type) = filter.request_type {
            query = query.filter(workflow_request::Column::RequestType.eq(request_type.as_str()));
        }
        if let Some(requester_id) = filter.requester_id {
            query = query.filter(workflow_request::Column::RequesterId.eq(requester_id));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .order_by_desc(workflow_request::Column::CreatedAt)
            .order_by_desc(workflow_request::Column::Id)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.db)
            .await?;
        Ok((items, total))
    }

    /// Move `id` to `to` only while its status is one of `from`.
    ///
    /// Returns the number of rows changed: 0 means another caller moved the
    /// request first, or it was never in `from`.
    pub async fn transition<C>(
        conn: &C,
        id: Uuid,
        from: &[WorkflowStatus],
        to: WorkflowStatus,
    ) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = WorkflowRequest::update_many()
            .col_expr(workflow_request::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                workflow_request::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(workflow_request::Column::Id.eq(id))
            .filter(workflow_request::Column::Status.is_in(from.iter().map(|s| s.as_str())))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Conditional no-op write that takes the row lock for `id` while it is
    /// still awaiting approval. Serialises concurrent approval decisions.
    pub async fn lock_awaiting_approval<C>(conn: &C, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = WorkflowRequest::update_many()
            .col_expr(
                workflow_request::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(workflow_request::Column::Id.eq(id))
            .filter(workflow_request::Column::Status.is_in([
                WorkflowStatus::Pending.as_str(),
                WorkflowStatus::InReview.as_str(),
            ]))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn attach_report<C>(
        conn: &C,
        request: workflow_request::Model,
        report: ExecutionReport,
    ) -> Result<workflow_request::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active: workflow_request::ActiveModel = request.into();
        active.execution_report = Set(Some(report));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(conn).await
    }
}
