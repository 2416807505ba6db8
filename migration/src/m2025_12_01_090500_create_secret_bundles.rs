//! Migration to create the secret_bundles table.
//!
//! Credential fields hold base64 ciphertext envelopes only. A partial unique
//! index keeps at most one active bundle per provider; both Postgres and
//! SQLite support `CREATE UNIQUE INDEX ... WHERE`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SecretBundles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SecretBundles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SecretBundles::Provider).text().not_null())
                    .col(ColumnDef::new(SecretBundles::ClientId).text().not_null())
                    .col(ColumnDef::new(SecretBundles::ClientSecret).text().not_null())
                    .col(ColumnDef::new(SecretBundles::SigningSecret).text().not_null())
                    .col(ColumnDef::new(SecretBundles::BotToken).text().null())
                    .col(ColumnDef::new(SecretBundles::UserToken).text().null())
                    .col(
                        ColumnDef::new(SecretBundles::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SecretBundles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SecretBundles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_secret_bundles_one_active \
                 ON secret_bundles (provider) WHERE is_active",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_secret_bundles_one_active").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SecretBundles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SecretBundles {
    Table,
    Id,
    Provider,
    ClientId,
    ClientSecret,
    SigningSecret,
    BotToken,
    UserToken,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
