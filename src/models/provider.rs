//! Provider tag shared by accounts, secret bundles and the adapter registry.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// External SaaS service against which accounts are provisioned
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ProviderTag {
    /// Google Workspace directory
    #[sea_orm(string_value = "google")]
    Google,
    /// Slack workspace
    #[sea_orm(string_value = "slack")]
    Slack,
    /// GitHub organization
    #[sea_orm(string_value = "github")]
    Github,
    /// Microsoft 365 / Entra ID tenant
    #[sea_orm(string_value = "microsoft")]
    Microsoft,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Google => "google",
            ProviderTag::Slack => "slack",
            ProviderTag::Github => "github",
            ProviderTag::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(ProviderTag::Google),
            "slack" => Ok(ProviderTag::Slack),
            "github" => Ok(ProviderTag::Github),
            "microsoft" => Ok(ProviderTag::Microsoft),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}
