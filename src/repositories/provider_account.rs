//! Provider account repository
//!
//! Accounts are inserted with `ON CONFLICT DO NOTHING` on the
//! `(employee_id, provider)` unique index, so concurrent provisioning calls
//! for the same pair can never both create a row.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::models::ProviderTag;
use crate::models::provider_account::{
    self, AccountMetadata, AccountStatus, Entity as ProviderAccount,
};

#[derive(Debug, Clone)]
pub struct NewProviderAccount {
    pub employee_id: Uuid,
    pub provider: ProviderTag,
    pub account_id: String,
    pub metadata: AccountMetadata,
}

#[derive(Debug, Clone)]
pub struct ProviderAccountRepository {
    db: DatabaseConnection,
}

impl ProviderAccountRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Cheap pre-check; the unique index remains the real guarantee
    pub async fn exists(&self, employee_id: Uuid, provider: ProviderTag) -> Result<bool, DbErr> {
        let count = ProviderAccount::find()
            .filter(provider_account::Column::EmployeeId.eq(employee_id))
            .filter(provider_account::Column::Provider.eq(provider.as_str()))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Insert an `active` account unless one already exists for the pair.
    ///
    /// Returns `None` when the conflict clause suppressed the insert.
    pub async fn insert_if_absent<C>(
        conn: &C,
        new: NewProviderAccount,
    ) -> Result<Option<provider_account::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();
        let model = provider_account::Model {
            id: Uuid::new_v4(),
            employee_id: new.employee_id,
            provider: new.provider,
            account_id: new.account_id,
            status: AccountStatus::Active,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        let active = provider_account::ActiveModel {
            id: Set(model.id),
            employee_id: Set(model.employee_id),
            provider: Set(model.provider),
            account_id: Set(model.account_id.clone()),
            status: Set(model.status),
            metadata: Set(model.metadata.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = ProviderAccount::insert(active)
            .on_conflict(
                OnConflict::columns([
                    provider_account::Column::EmployeeId,
                    provider_account::Column::Provider,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok((inserted > 0).then_some(model))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<provider_account::Model>, DbErr> {
        ProviderAccount::find_by_id(id).one(&self.db).await
    }

    pub async fn list_for_employee(
        &self,
        employee_id: Uuid,
    ) -> Result<Vec<provider_account::Model>, DbErr> {
        ProviderAccount::find()
            .filter(provider_account::Column::EmployeeId.eq(employee_id))
            .order_by_asc(provider_account::Column::Provider)
            .all(&self.db)
            .await
    }

    pub async fn count(&self) -> Result<u64, DbErr> {
        ProviderAccount::find().count(&self.db).await
    }

    /// Move an account to `deleted` unless it already is; returns rows changed
    pub async fn mark_deleted<C>(conn: &C, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = ProviderAccount::update_many()
            .col_expr(
                provider_account::Column::Status,
                Expr::value(AccountStatus::Deleted.as_str()),
            )
            .col_expr(
                provider_account::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(provider_account::Column::Id.eq(id))
            .filter(provider_account::Column::Status.ne(AccountStatus::Deleted.as_str()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
