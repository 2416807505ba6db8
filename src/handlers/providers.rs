//! # Providers API Handlers
//!
//! Catalogue of registered providers and whether each has active credentials.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{ActorHeader, OperatorAuth};
use crate::connectors::ProviderMetadata;
use crate::error::ApiError;
use crate::server::AppState;

/// Provider entry in the catalogue
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    #[serde(flatten)]
    pub metadata: ProviderMetadata,
    /// An active secret bundle exists for this provider
    pub configured: bool,
}

/// Response containing the provider catalogue
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    /// Providers sorted by tag
    pub providers: Vec<ProviderInfo>,
}

/// List registered providers with their capabilities
#[utoipa::path(
    get,
    path = "/providers",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    responses(
        (status = 200, description = "Provider catalogue", body = ProvidersResponse, example = json!({
            "providers": [
                {
                    "provider": "github",
                    "displayName": "GitHub",
                    "authType": "bearer",
                    "scopes": ["admin:org"],
                    "capabilities": ["list_identities", "create_identity", "deactivate_identity"],
                    "externalIdRule": "assigned_by_provider",
                    "configured": false
                }
            ]
        })),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let mut providers = Vec::new();
    for metadata in state.registry.list_metadata() {
        let configured = state.secrets.has_active(metadata.provider).await?;
        providers.push(ProviderInfo {
            metadata,
            configured,
        });
    }

    Ok(Json(ProvidersResponse { providers }))
}
