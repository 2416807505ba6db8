//! Provider account entity model
//!
//! One row per employee per provider. Rows are created only by the
//! provisioning pipeline and are never overwritten; the composite unique
//! index on `(employee_id, provider)` backs the dedup guarantee.

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::provider::ProviderTag;

/// Lifecycle of an account at the external provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "suspended")]
    Suspended,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deleted => "deleted",
        }
    }
}

/// Provider-specific provisioning metadata, keyed by provider
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum AccountMetadata {
    Google {
        org_unit: String,
        license: String,
        groups: Vec<String>,
    },
    Slack {
        display_name: String,
        title: String,
        channels: Vec<String>,
    },
    Github {
        role: String,
        teams: Vec<String>,
        /// Login assigned by GitHub, filled in from the creation response
        login: Option<String>,
    },
    Microsoft {
        license: String,
        job_title: String,
        groups: Vec<String>,
    },
}

impl AccountMetadata {
    pub fn provider(&self) -> ProviderTag {
        match self {
            AccountMetadata::Google { .. } => ProviderTag::Google,
            AccountMetadata::Slack { .. } => ProviderTag::Slack,
            AccountMetadata::Github { .. } => ProviderTag::Github,
            AccountMetadata::Microsoft { .. } => ProviderTag::Microsoft,
        }
    }

    /// Groups, channels or teams the new identity should join
    pub fn memberships(&self) -> &[String] {
        match self {
            AccountMetadata::Google { groups, .. } => groups,
            AccountMetadata::Slack { channels, .. } => channels,
            AccountMetadata::Github { teams, .. } => teams,
            AccountMetadata::Microsoft { groups, .. } => groups,
        }
    }
}

/// Employee account at one external provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "provider_accounts")]
pub struct Model {
    /// Unique identifier for the account row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Employee the account belongs to
    pub employee_id: Uuid,

    /// Provider the account lives at
    pub provider: ProviderTag,

    /// External account identifier as known by the provider
    pub account_id: String,

    pub status: AccountStatus,

    /// Provisioning metadata applied at creation time
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: AccountMetadata,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::EmployeeId",
        to = "super::employee::Column::Id"
    )]
    Employee,
}

impl Related<super::employee::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employee.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_tagged_by_provider() {
        let metadata = AccountMetadata::Slack {
            display_name: "ada".to_string(),
            title: "Engineer".to_string(),
            channels: vec!["#general".to_string()],
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["provider"], "slack");
        assert_eq!(metadata.provider(), ProviderTag::Slack);
        assert_eq!(metadata.memberships(), ["#general".to_string()]);
    }

    #[test]
    fn metadata_rejects_unknown_provider_tag() {
        let json = serde_json::json!({ "provider": "dropbox", "folder": "/" });
        assert!(serde_json::from_value::<AccountMetadata>(json).is_err());
    }
}
