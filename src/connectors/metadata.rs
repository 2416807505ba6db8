//! Provider metadata types
//!
//! Describes how a provider authenticates and which capabilities its adapter
//! exposes. Served by the provider catalogue endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::ExternalIdRule;
use crate::models::ProviderTag;

/// Authentication type used by a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// OAuth 2.0 access token minted for a service principal or app
    OAuth2,
    /// Long-lived bot or installation token
    Bearer,
}

/// Operations an adapter supports beyond the required roster calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ListIdentities,
    CreateIdentity,
    DeactivateIdentity,
    ListGroups,
    CreateGroup,
    AddMemberToGroup,
}

impl Capability {
    /// Capabilities every adapter must provide
    pub const REQUIRED: [Capability; 3] = [
        Capability::ListIdentities,
        Capability::CreateIdentity,
        Capability::DeactivateIdentity,
    ];

    /// Required capabilities plus group management
    pub fn with_groups() -> Vec<Capability> {
        let mut capabilities = Self::REQUIRED.to_vec();
        capabilities.extend([
            Capability::ListGroups,
            Capability::CreateGroup,
            Capability::AddMemberToGroup,
        ]);
        capabilities
    }
}

/// Metadata about a provider
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub provider: ProviderTag,
    /// Human-readable name
    pub display_name: String,
    pub auth_type: AuthType,
    /// Scopes the configured token must carry
    pub scopes: Vec<String>,
    pub capabilities: Vec<Capability>,
    /// How the external account id is derived for this provider
    pub external_id_rule: ExternalIdRule,
}

impl ProviderMetadata {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
