//! Migration to create the provider_accounts table.
//!
//! The composite unique index on `(employee_id, provider)` is the storage-level
//! guarantee behind provisioning dedup; inserts use `ON CONFLICT DO NOTHING`
//! against it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderAccounts::EmployeeId).uuid().not_null())
                    .col(ColumnDef::new(ProviderAccounts::Provider).text().not_null())
                    .col(ColumnDef::new(ProviderAccounts::AccountId).text().not_null())
                    .col(
                        ColumnDef::new(ProviderAccounts::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(ProviderAccounts::Metadata)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provider_accounts_employee_id")
                            .from(ProviderAccounts::Table, ProviderAccounts::EmployeeId)
                            .to(Employees::Table, Employees::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provider_accounts_employee_provider")
                    .table(ProviderAccounts::Table)
                    .col(ProviderAccounts::EmployeeId)
                    .col(ProviderAccounts::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_provider_accounts_employee_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProviderAccounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderAccounts {
    Table,
    Id,
    EmployeeId,
    Provider,
    AccountId,
    Status,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Employees {
    Table,
    Id,
}
