//! # Authentication and Actor Identity
//!
//! Operator bearer authentication for protected endpoints, plus the
//! `X-Actor-Id` header naming the user on whose behalf the call is made.
//! The actor is what audit entries record; calls without the header are
//! attributed to the system actor.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::models::audit_log::SYSTEM_ACTOR;
use crate::server::AppState;

pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// User the request acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }

    /// Identifier written to audit entries
    pub fn audit_id(&self) -> String {
        match self {
            Actor::User(id) => id.to_string(),
            Actor::System => SYSTEM_ACTOR.to_string(),
        }
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates bearer tokens and the actor header
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let token = extract_bearer_token(headers)?;
    validate_token(&config, token)?;

    let actor = extract_actor(headers)?;
    tracing::debug!(actor = %actor.audit_id(), "Authenticated operator request");

    request.extensions_mut().insert(actor);
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        tracing::warn!("Rejected request with invalid operator token");
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_actor(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let Some(value) = headers.get(ACTOR_HEADER) else {
        return Ok(Actor::System);
    };

    let value = value.to_str().map_err(|_| {
        validation_error(
            "Invalid actor header",
            serde_json::json!({ ACTOR_HEADER: "Header must be valid UTF-8" }),
        )
    })?;

    value.trim().parse::<Uuid>().map(Actor::User).map_err(|_| {
        validation_error(
            "Invalid actor ID",
            serde_json::json!({ ACTOR_HEADER: "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-Actor-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct ActorHeader {
    /// User (UUID) the call acts for; audit entries fall back to `system`
    #[serde(rename = "X-Actor-Id")]
    #[param(rename = "X-Actor-Id", value_type = Option<String>)]
    pub actor_id: Option<String>,
}

impl<S> FromRequestParts<S> for Actor
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Actor>() {
            Some(actor) => Ok(*actor),
            None => extract_actor(&parts.headers),
        }
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    async fn handler(_auth: OperatorAuth, actor: Actor) -> String {
        actor.audit_id()
    }

    fn test_app() -> Router {
        let config = Arc::new(AppConfig {
            operator_tokens: vec!["test-token-123".to_string()],
            ..Default::default()
        });
        Router::new()
            .route("/test", get(handler))
            .layer(axum::middleware::from_fn_with_state(
                config.clone(),
                auth_middleware,
            ))
            .with_state(config)
    }

    async fn send(request: Request<Body>) -> (StatusCode, String) {
        let response = test_app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (status, _) = send(Request::get("/test").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_scheme_and_wrong_token_are_unauthorized() {
        for header in ["Basic dGVzdA==", "Bearer nope"] {
            let request = Request::get("/test")
                .header(AUTHORIZATION, header)
                .body(Body::empty())
                .unwrap();
            let (status, _) = send(request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_actor_defaults_to_system() {
        let request = Request::get("/test")
            .header(AUTHORIZATION, "Bearer test-token-123")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, SYSTEM_ACTOR);
    }

    #[tokio::test]
    async fn test_actor_header_is_parsed() {
        let actor = Uuid::new_v4();
        let request = Request::get("/test")
            .header(AUTHORIZATION, "Bearer test-token-123")
            .header(ACTOR_HEADER, actor.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, actor.to_string());
    }

    #[tokio::test]
    async fn test_malformed_actor_header_is_rejected() {
        let request = Request::get("/test")
            .header(AUTHORIZATION, "Bearer test-token-123")
            .header(ACTOR_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
