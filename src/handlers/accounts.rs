//! # Accounts API Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::auth::{Actor, ActorHeader, OperatorAuth};
use crate::error::ApiError;
use crate::handlers::types::{AccountView, parse_uuid};
use crate::server::AppState;

/// Deactivate an account at its provider and mark it deleted
#[utoipa::path(
    delete,
    path = "/accounts/{id}",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = Uuid, Path, description = "Provider account UUID")
    ),
    responses(
        (status = 200, description = "Account deactivated", body = AccountView),
        (status = 404, description = "Account not found", body = ApiError),
        (status = 409, description = "Account already deleted", body = ApiError),
        (status = 412, description = "Provider not configured", body = ApiError),
        (status = 502, description = "Provider call failed", body = ApiError)
    ),
    tag = "provisioning"
)]
pub async fn deactivate_account(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<AccountView>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let account = state
        .provisioner
        .deactivate_account(id, &actor.audit_id())
        .await?;
    Ok(Json(account.into()))
}
