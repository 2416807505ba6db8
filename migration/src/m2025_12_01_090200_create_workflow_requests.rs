//! Migration to create the workflow_requests table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRequests::RequestType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowRequests::RequesterId).uuid().not_null())
                    .col(ColumnDef::new(WorkflowRequests::TargetUserId).uuid().not_null())
                    .col(
                        ColumnDef::new(WorkflowRequests::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(WorkflowRequests::Data).json_binary().not_null())
                    .col(
                        ColumnDef::new(WorkflowRequests::ExecutionReport)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkflowRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_requests_status")
                    .table(WorkflowRequests::Table)
                    .col(WorkflowRequests::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_workflow_requests_status").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(WorkflowRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkflowRequests {
    Table,
    Id,
    RequestType,
    RequesterId,
    TargetUserId,
    Status,
    Data,
    ExecutionReport,
    CreatedAt,
    UpdatedAt,
}
