//! # Error Handling
//!
//! Domain error taxonomy for the provisioning engine and its mapping onto a
//! consistent problem+json HTTP response with trace ID propagation.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::connectors::{AdapterError, ProviderError};
use crate::crypto::VaultError;
use crate::models::ProviderTag;
use crate::telemetry;

/// Errors produced by the engine's operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input shape; never retried automatically
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },
    /// Dedup hit; informational inside a batch
    #[error("{0}")]
    AlreadyExists(String),
    /// Transition attempted from a terminal or wrong state
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("provider '{provider}' is not configured")]
    NotConfigured { provider: ProviderTag },
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Decryption or verification failure; always fatal
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// A dropped audit record is a compliance defect, never a soft failure
    #[error("audit append failed: {0}")]
    Audit(#[source] sea_orm::DbErr),
}

impl EngineError {
    pub fn not_found<S: ToString>(resource: &'static str, id: S) -> Self {
        EngineError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code used in API responses and batch reports
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_FAILED",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::NotConfigured { .. } => "NOT_CONFIGURED",
            EngineError::Provider(_) => "PROVIDER_ERROR",
            EngineError::Integrity(_) => "INTEGRITY_ERROR",
            EngineError::Database(_) => "DATABASE_ERROR",
            EngineError::Audit(_) => "AUDIT_FAILED",
        }
    }

    /// Errors that abort a whole batch instead of failing one unit
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Database(_) | EngineError::Audit(_) | EngineError::Integrity(_)
        )
    }
}

impl From<AdapterError> for EngineError {
    fn from(error: AdapterError) -> Self {
        match error {
            AdapterError::Provider(provider_error) => EngineError::Provider(provider_error),
            AdapterError::NotConfigured { provider, .. } => EngineError::NotConfigured { provider },
        }
    }
}

impl From<VaultError> for EngineError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::MissingField(field) => {
                EngineError::Validation(format!("{} is required", field))
            }
            VaultError::Integrity(details) => EngineError::Integrity(details),
            VaultError::InvalidKey(details) | VaultError::EncryptionFailed(details) => {
                EngineError::Integrity(details)
            }
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Current trace ID, falling back to a generated correlation ID
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| Some(telemetry::generate_trace_id().into_boxed_str()))
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code = code.as_ref();
        code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code)
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let code = error.code();
        match error {
            EngineError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, code, &message)
            }
            EngineError::NotFound { resource, id } => Self::new(
                StatusCode::NOT_FOUND,
                code,
                &format!("{} '{}' not found", resource, id),
            )
            .with_details(json!({ "resource": resource, "id": id })),
            EngineError::AlreadyExists(message) => Self::new(StatusCode::CONFLICT, code, &message),
            EngineError::InvalidState(message) => Self::new(StatusCode::CONFLICT, code, &message),
            EngineError::NotConfigured { provider } => Self::new(
                StatusCode::PRECONDITION_FAILED,
                code,
                &format!("Provider '{}' has no active credentials", provider),
            )
            .with_details(json!({ "provider": provider, "setup_required": true })),
            EngineError::Provider(provider_error) => {
                let retry_after = (provider_error.code == "rate_limited").then_some(30);
                let api_error = Self::new(
                    StatusCode::BAD_GATEWAY,
                    code,
                    &format!("Provider call failed: {}", provider_error.message),
                )
                .with_details(json!(provider_error));
                match retry_after {
                    Some(seconds) => api_error.with_retry_after(seconds),
                    None => api_error,
                }
            }
            EngineError::Integrity(details) => {
                tracing::error!(details = %details, "Secret integrity check failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "Stored secret failed integrity verification",
                )
            }
            EngineError::Database(db_error) => db_error.into(),
            EngineError::Audit(db_error) => {
                tracing::error!(error = ?db_error, "Audit append failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "Audit trail could not be written",
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                "Resource already exists",
            );
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details (400)
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_status_mapping() {
        let cases: Vec<(EngineError, StatusCode, &str)> = vec![
            (
                EngineError::Validation("employeeIds is empty".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                EngineError::not_found("workflow_request", "abc"),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                EngineError::AlreadyExists("dup".into()),
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
            ),
            (
                EngineError::InvalidState("terminal".into()),
                StatusCode::CONFLICT,
                "INVALID_STATE",
            ),
            (
                EngineError::NotConfigured {
                    provider: ProviderTag::Slack,
                },
                StatusCode::PRECONDITION_FAILED,
                "NOT_CONFIGURED",
            ),
            (
                EngineError::Provider(ProviderError::new("unauthorized", "bad token")),
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
            ),
            (
                EngineError::Integrity("tag mismatch".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTEGRITY_ERROR",
            ),
        ];

        for (engine_error, status, code) in cases {
            let api_error: ApiError = engine_error.into();
            assert_eq!(api_error.status, status);
            assert_eq!(api_error.code.as_ref(), code);
            assert!(api_error.trace_id.is_some());
        }
    }

    #[test]
    fn test_batch_fatal_classification() {
        assert!(EngineError::Integrity("tag".into()).is_batch_fatal());
        assert!(EngineError::Audit(sea_orm::DbErr::Custom("disk full".into())).is_batch_fatal());
        assert!(!EngineError::AlreadyExists("dup".into()).is_batch_fatal());
        assert!(
            !EngineError::Provider(ProviderError::new("timeout", "slow")).is_batch_fatal()
        );
    }

    #[test]
    fn test_not_configured_signals_setup_required() {
        let api_error: ApiError = EngineError::NotConfigured {
            provider: ProviderTag::Github,
        }
        .into();
        let details = api_error.details.expect("details present");
        assert_eq!(details["setup_required"], true);
        assert_eq!(details["provider"], "github");
    }

    #[test]
    fn test_integrity_error_hides_details() {
        let api_error: ApiError = EngineError::Integrity("nonce 0x1234 bad".into()).into();
        assert!(!api_error.message.contains("0x1234"));
        assert!(api_error.details.is_none());
    }

    #[test]
    fn test_rate_limited_provider_sets_retry_after() {
        let api_error: ApiError =
            EngineError::Provider(ProviderError::new("rate_limited", "slow down")).into();
        assert_eq!(api_error.retry_after, Some(30));

        let response = api_error.into_response();
        assert_eq!(response.headers().get("retry-after").unwrap(), "30");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_adapter_and_vault_errors_convert() {
        let engine_error: EngineError =
            AdapterError::not_configured(ProviderTag::Slack, "missing bot token").into();
        assert!(matches!(
            engine_error,
            EngineError::NotConfigured {
                provider: ProviderTag::Slack
            }
        ));

        let engine_error: EngineError = VaultError::MissingField("client_id").into();
        assert_eq!(engine_error.code(), "VALIDATION_FAILED");

        let engine_error: EngineError = VaultError::Integrity("bad".into()).into();
        assert_eq!(engine_error.code(), "INTEGRITY_ERROR");
    }

    #[test]
    fn test_database_record_not_found_maps_to_404() {
        let api_error: ApiError =
            EngineError::Database(sea_orm::DbErr::RecordNotFound("employee".into())).into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!({ "providers": "must not be empty" });
        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }

    #[test]
    fn test_from_anyhow_is_generic_500() {
        let api_error: ApiError = anyhow::anyhow!("pool exhausted").into();
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_error.message.contains("pool"));
    }
}
