//! Migration to create the employees table.
//!
//! Employees are written by HR intake and only read by provisioning.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Employees::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Employees::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Employees::Email).text().not_null())
                    .col(ColumnDef::new(Employees::FirstName).text().not_null())
                    .col(ColumnDef::new(Employees::LastName).text().not_null())
                    .col(ColumnDef::new(Employees::Department).text().not_null())
                    .col(ColumnDef::new(Employees::Position).text().not_null())
                    .col(ColumnDef::new(Employees::ManagerId).uuid().null())
                    .col(
                        ColumnDef::new(Employees::HiredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Employees::TerminatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Employees::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Employees::UpdatedAt)
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
                    .name("idx_employees_email")
                    .table(Employees::Table)
                    .col(Employees::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_employees_email").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Employees::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Employees {
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    Department,
    Position,
    ManagerId,
    HiredAt,
    TerminatedAt,
    CreatedAt,
    UpdatedAt,
}
