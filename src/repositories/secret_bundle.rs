//! Secret bundle repository
//!
//! Stores vault envelopes only. Activation flips `is_active` for a whole
//! provider inside the caller's transaction, backed by the partial unique
//! index that allows a single active row per provider.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::crypto::CipherBundle;
use crate::models::ProviderTag;
use crate::models::secret_bundle::{self, Entity as SecretBundle};

impl From<&secret_bundle::Model> for CipherBundle {
    fn from(model: &secret_bundle::Model) -> Self {
        CipherBundle {
            client_id: model.client_id.clone(),
            client_secret: model.client_secret.clone(),
            signing_secret: model.signing_secret.clone(),
            bot_token: model.bot_token.clone(),
            user_token: model.user_token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecretBundleRepository {
    db: DatabaseConnection,
}

impl SecretBundleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert an inactive bundle
    pub async fn insert<C>(
        conn: &C,
        provider: ProviderTag,
        cipher: CipherBundle,
    ) -> Result<secret_bundle::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();
        let model = secret_bundle::Model {
            id: Uuid::new_v4(),
            provider,
            client_id: cipher.client_id,
            client_secret: cipher.client_secret,
            signing_secret: cipher.signing_secret,
            bot_token: cipher.bot_token,
            user_token: cipher.user_token,
            is_active: false,
            created_at: now,
            updated_at: now,
        };

        let active = secret_bundle::ActiveModel {
            id: Set(model.id),
            provider: Set(model.provider),
            client_id: Set(model.client_id.clone()),
            client_secret: Set(model.client_secret.clone()),
            signing_secret: Set(model.signing_secret.clone()),
            bot_token: Set(model.bot_token.clone()),
            user_token: Set(model.user_token.clone()),
            is_active: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        SecretBundle::insert(active).exec_without_returning(conn).await?;

        Ok(model)
    }

    pub async fn find_by_id<C>(conn: &C, id: Uuid) -> Result<Option<secret_bundle::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        SecretBundle::find_by_id(id).one(conn).await
    }

    pub async fn find_active(
        &self,
        provider: ProviderTag,
    ) -> Result<Option<secret_bundle::Model>, DbErr> {
        SecretBundle::find()
            .filter(secret_bundle::Column::Provider.eq(provider.as_str()))
            .filter(secret_bundle::Column::IsActive.eq(true))
            .one(&self.db)
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<secret_bundle::Model>, DbErr> {
        SecretBundle::find()
            .order_by_asc(secret_bundle::Column::Provider)
            .order_by_asc(secret_bundle::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn replace_ciphertext<C>(
        conn: &C,
        existing: secret_bundle::Model,
        cipher: CipherBundle,
    ) -> Result<secret_bundle::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active: secret_bundle::ActiveModel = existing.into();
        active.client_id = Set(cipher.client_id);
        active.client_secret = Set(cipher.client_secret);
        active.signing_secret = Set(cipher.signing_secret);
        active.bot_token = Set(cipher.bot_token);
        active.user_token = Set(cipher.user_token);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(conn).await
    }

    pub async fn delete<C>(conn: &C, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(SecretBundle::delete_by_id(id).exec(conn).await?.rows_affected)
    }

    /// Deactivate every bundle of `provider`, then activate `id`.
    ///
    /// Must run inside a transaction so no reader sees zero or two active rows.
    /// Returns the rows changed by the activating update.
    pub async fn activate<C>(conn: &C, provider: ProviderTag, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();
        SecretBundle::update_many()
            .col_expr(secret_bundle::Column::IsActive, Expr::value(false))
            .col_expr(secret_bundle::Column::UpdatedAt, Expr::value(now))
            .filter(secret_bundle::Column::Provider.eq(provider.as_str()))
            .filter(secret_bundle::Column::IsActive.eq(true))
            .exec(conn)
            .await?;

        let result = SecretBundle::update_many()
            .col_expr(secret_bundle::Column::IsActive, Expr::value(true))
            .col_expr(secret_bundle::Column::UpdatedAt, Expr::value(now))
            .filter(secret_bundle::Column::Id.eq(id))
            .filter(secret_bundle::Column::Provider.eq(provider.as_str()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
