//! Migration to create the approvals table.
//!
//! One row per `(workflow_request_id, approver_id)` assignment.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Approvals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Approvals::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Approvals::WorkflowRequestId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Approvals::ApproverId).uuid().not_null())
                    .col(
                        ColumnDef::new(Approvals::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Approvals::Comment).text().null())
                    .col(
                        ColumnDef::new(Approvals::DecidedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Approvals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approvals_workflow_request_id")
                            .from(Approvals::Table, Approvals::WorkflowRequestId)
                            .to(WorkflowRequests::Table, WorkflowRequests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_approvals_request_approver")
                    .table(Approvals::Table)
                    .col(Approvals::WorkflowRequestId)
                    .col(Approvals::ApproverId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_approvals_request_approver").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Approvals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Approvals {
    Table,
    Id,
    WorkflowRequestId,
    ApproverId,
    Status,
    Comment,
    DecidedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WorkflowRequests {
    Table,
    Id,
}
