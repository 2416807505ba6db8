//! Employee entity model
//!
//! Employees are created by HR intake and terminated (never deleted) on
//! offboarding. The provisioning engine only reads them.

use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

/// Internal identity that accounts are provisioned for
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "employees")]
pub struct Model {
    /// Unique identifier for the employee (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Work email, unique across the directory
    #[sea_orm(unique)]
    pub email: String,

    pub first_name: String,

    pub last_name: String,

    /// Department used by the identity mapper for org unit and group defaults
    pub department: String,

    /// Job title used by the identity mapper for license and role defaults
    pub position: String,

    /// Reporting manager, if any
    pub manager_id: Option<Uuid>,

    pub hired_at: DateTimeWithTimeZone,

    /// Set on offboarding; terminated employees are never provisioned
    pub terminated_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_terminated(&self) -> bool {
        self.terminated_at.is_some()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::provider_account::Entity")]
    ProviderAccounts,
}

impl Related<super::provider_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProviderAccounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
