//! Secret bundle entity model
//!
//! Every credential column holds a base64 vault envelope, never plaintext.
//! At most one bundle per provider is active; see the partial unique index
//! `idx_secret_bundles_one_active`.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use super::provider::ProviderTag;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "secret_bundles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub provider: ProviderTag,

    /// Encrypted client id envelope
    pub client_id: String,

    /// Encrypted client secret envelope
    pub client_secret: String,

    /// Encrypted signing secret envelope
    pub signing_secret: String,

    /// Encrypted bot token envelope, absent when not configured
    pub bot_token: Option<String>,

    /// Encrypted user token envelope, absent when not configured
    pub user_token: Option<String>,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
