//! # Secret Bundle API Handlers
//!
//! Credential bundles are written and read in plaintext over the API only;
//! everything stored is vault ciphertext.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::{Actor, ActorHeader, OperatorAuth};
use crate::crypto::PlainSecretBundle;
use crate::error::{ApiError, validation_error};
use crate::handlers::types::{SecretBundleView, parse_uuid};
use crate::models::ProviderTag;
use crate::secrets::TestReport;
use crate::server::AppState;

/// Plaintext credentials submitted for create, update or test
#[derive(Deserialize, Serialize, ToSchema, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SecretRequest {
    /// Required on create and test; must match the stored bundle on update
    #[zeroize(skip)]
    pub provider: Option<ProviderTag>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub signing_secret: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub user_token: Option<String>,
}

impl SecretRequest {
    fn plain(&self) -> PlainSecretBundle {
        PlainSecretBundle {
            client_id: self.client_id.trim().to_string(),
            client_secret: self.client_secret.trim().to_string(),
            signing_secret: self.signing_secret.trim().to_string(),
            bot_token: non_blank(&self.bot_token),
            user_token: non_blank(&self.user_token),
        }
    }

    fn require_provider(&self) -> Result<ProviderTag, ApiError> {
        self.provider.ok_or_else(|| {
            validation_error(
                "provider is required",
                serde_json::json!({ "provider": "Required field is missing" }),
            )
        })
    }
}

/// Absent and blank optional tokens are both stored as absent
fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Decrypted active bundle
#[derive(Serialize, Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSecretResponse {
    #[zeroize(skip)]
    pub provider: ProviderTag,
    pub client_id: String,
    pub client_secret: String,
    pub signing_secret: String,
    pub bot_token: Option<String>,
    pub user_token: Option<String>,
}

/// Create an inactive credential bundle
#[utoipa::path(
    post,
    path = "/secrets",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = SecretRequest,
    responses(
        (status = 201, description = "Bundle stored (inactive)", body = SecretBundleView),
        (status = 400, description = "Missing provider or required credential field", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "secrets"
)]
pub async fn create_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    payload: Result<Json<SecretRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SecretBundleView>), ApiError> {
    let Json(request) = payload?;
    let provider = request.require_provider()?;

    let bundle = state
        .secrets
        .create(provider, &request.plain(), &actor.audit_id())
        .await?;
    Ok((StatusCode::CREATED, Json(bundle.into())))
}

/// Read the decrypted active bundle for a provider
#[utoipa::path(
    get,
    path = "/secrets/{provider}",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("provider" = ProviderTag, Path, description = "Provider tag")
    ),
    responses(
        (status = 200, description = "Decrypted active bundle", body = ActiveSecretResponse),
        (status = 400, description = "Unknown provider", body = ApiError),
        (status = 412, description = "No active bundle for the provider", body = ApiError),
        (status = 500, description = "Stored bundle failed integrity verification", body = ApiError)
    ),
    tag = "secrets"
)]
pub async fn get_active_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(provider): Path<String>,
) -> Result<Json<ActiveSecretResponse>, ApiError> {
    let provider = provider.parse::<ProviderTag>().map_err(|message| {
        validation_error(
            "Unknown provider",
            serde_json::json!({ "provider": message }),
        )
    })?;

    let plain = state.secrets.get_active(provider).await?;
    tracing::info!(provider = %provider, actor = %actor.audit_id(), "Active secret bundle read");

    Ok(Json(ActiveSecretResponse {
        provider,
        client_id: plain.client_id.clone(),
        client_secret: plain.client_secret.clone(),
        signing_secret: plain.signing_secret.clone(),
        bot_token: plain.bot_token.clone(),
        user_token: plain.user_token.clone(),
    }))
}

/// Replace the credentials of a stored bundle
#[utoipa::path(
    put,
    path = "/secrets/{id}",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Secret bundle UUID")
    ),
    request_body = SecretRequest,
    responses(
        (status = 200, description = "Bundle updated", body = SecretBundleView),
        (status = 400, description = "Missing field or provider mismatch", body = ApiError),
        (status = 404, description = "Bundle not found", body = ApiError)
    ),
    tag = "secrets"
)]
pub async fn update_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<SecretRequest>, JsonRejection>,
) -> Result<Json<SecretBundleView>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let Json(request) = payload?;

    let bundle = state
        .secrets
        .update(id, request.provider, &request.plain(), &actor.audit_id())
        .await?;
    Ok(Json(bundle.into()))
}

/// Delete a stored bundle
#[utoipa::path(
    delete,
    path = "/secrets/{id}",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Secret bundle UUID")
    ),
    responses(
        (status = 204, description = "Bundle deleted"),
        (status = 404, description = "Bundle not found", body = ApiError)
    ),
    tag = "secrets"
)]
pub async fn delete_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_uuid(&id, "id")?;
    state.secrets.delete(id, &actor.audit_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Make a bundle the provider's only active bundle
#[utoipa::path(
    post,
    path = "/secrets/{id}/activate",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Secret bundle UUID")
    ),
    responses(
        (status = 200, description = "Bundle activated", body = SecretBundleView),
        (status = 404, description = "Bundle not found", body = ApiError),
        (status = 500, description = "Bundle failed integrity verification", body = ApiError)
    ),
    tag = "secrets"
)]
pub async fn activate_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<SecretBundleView>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let bundle = state.secrets.activate(id, &actor.audit_id()).await?;
    Ok(Json(bundle.into()))
}

/// Test candidate credentials against the provider without storing them
#[utoipa::path(
    post,
    path = "/secrets/test",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = SecretRequest,
    responses(
        (status = 200, description = "Test outcome", body = TestReport, example = json!({
            "provider": "slack",
            "outcome": "partial",
            "checks": [
                { "name": "list_identities", "ok": true },
                { "name": "list_groups", "ok": false, "message": "[forbidden] missing_scope" }
            ]
        })),
        (status = 400, description = "Missing provider or required credential field", body = ApiError)
    ),
    tag = "secrets"
)]
pub async fn test_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<SecretRequest>, JsonRejection>,
) -> Result<Json<TestReport>, ApiError> {
    let Json(request) = payload?;
    let provider = request.require_provider()?;

    let report = state.secrets.test(provider, &request.plain()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_optional_tokens_become_absent() {
        let request: SecretRequest = serde_json::from_value(serde_json::json!({
            "provider": "slack",
            "clientId": " id ",
            "clientSecret": "secret",
            "signingSecret": "signing",
            "botToken": "   ",
        }))
        .unwrap();

        let plain = request.plain();
        assert_eq!(plain.client_id, "id");
        assert_eq!(plain.bot_token, None);
        assert_eq!(plain.user_token, None);
    }

    #[test]
    fn test_missing_provider_is_validation_error() {
        let request: SecretRequest =
            serde_json::from_value(serde_json::json!({ "clientId": "id" })).unwrap();
        let error = request.require_provider().unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }
}
