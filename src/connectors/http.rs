//! Authenticated HTTP transport shared by the provider adapters
//!
//! Each adapter owns one `HttpTransport` built from its secret bundle. The
//! transport attaches the bearer token, applies the per-call timeout, and
//! hands non-success responses to the adapter's own error translator so
//! provider-specific error bodies end up as a uniform `ProviderError`.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;
use zeroize::Zeroizing;

use crate::connectors::trait_::{AdapterError, ProviderError};
use crate::models::ProviderTag;

const USER_AGENT: &str = concat!("provisioning-engine/", env!("CARGO_PKG_VERSION"));

/// Provider-specific translation of an error response body
pub type ErrorTranslator = fn(StatusCode, &JsonValue) -> ProviderError;

/// Transport settings shared by all adapters
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
        }
    }
}

pub struct HttpTransport {
    provider: ProviderTag,
    client: reqwest::Client,
    base: Url,
    token: Zeroizing<String>,
    translate: ErrorTranslator,
}

impl HttpTransport {
    pub fn new(
        provider: ProviderTag,
        base: &str,
        token: &str,
        settings: &HttpSettings,
        translate: ErrorTranslator,
    ) -> Result<Self, AdapterError> {
        let mut base = Url::parse(base).map_err(|e| {
            AdapterError::not_configured(provider, format!("invalid API base '{}': {}", base, e))
        })?;
        // Keep path prefixes such as `/v1.0` when joining relative paths
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::new("transport", e.to_string()))?;

        Ok(Self {
            provider,
            client,
            base,
            token: Zeroizing::new(token.to_string()),
            translate,
        })
    }

    pub fn provider(&self) -> ProviderTag {
        self.provider
    }

    fn url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::new("invalid_request", e.to_string()))
    }

    /// Send a request and decode the JSON body; an empty body decodes as `null`.
    pub async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, ProviderError> {
        let mut request = self
            .client
            .request(method.clone(), self.url(path)?)
            .bearer_auth(self.token.as_str())
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;

        let json: JsonValue = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
        };

        if !status.is_success() {
            tracing::debug!(
                provider = %self.provider,
                method = %method,
                path = path,
                status = status.as_u16(),
                "Provider returned error status"
            );
            return Err((self.translate)(status, &json));
        }

        serde_json::from_value(json).map_err(|e| {
            ProviderError::new(
                "malformed_response",
                format!("{} response could not be decoded: {}", self.provider, e),
            )
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        self.send::<JsonValue, T>(Method::GET, path, query, None)
            .await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.send::<JsonValue, JsonValue>(Method::DELETE, path, &[], None)
            .await
            .map(|_| ())
    }

    fn transport_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::new("timeout", format!("{} request timed out", self.provider))
        } else {
            ProviderError::new(
                "network_error",
                format!("{} request failed: {}", self.provider, error),
            )
        }
    }
}

/// Code for an HTTP status when the body carries nothing more specific
pub fn status_code_name(status: StatusCode) -> String {
    match status.as_u16() {
        400 | 422 => "invalid_request".to_string(),
        401 => "unauthorized".to_string(),
        403 => "forbidden".to_string(),
        404 => "not_found".to_string(),
        409 => "conflict".to_string(),
        429 => "rate_limited".to_string(),
        500..=599 => "upstream_unavailable".to_string(),
        other => format!("http_{}", other),
    }
}

/// Truncate upstream text so error messages stay bounded
pub fn snippet(text: &str) -> String {
    if text.chars().count() > 200 {
        let truncated: String = text.chars().take(200).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn translate(status: StatusCode, body: &JsonValue) -> ProviderError {
        let message = body["message"].as_str().unwrap_or("no message");
        ProviderError::new(status_code_name(status), message)
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(
            ProviderTag::Github,
            base,
            "test-token",
            &HttpSettings {
                timeout: Duration::from_millis(200),
            },
            translate,
        )
        .expect("transport builds")
    }

    #[tokio::test]
    async fn sends_bearer_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .mount(&server)
            .await;

        let transport = transport(&format!("{}/api", server.uri()));
        let users: Vec<JsonValue> = transport.get("users", &[("page", "2")]).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn translates_error_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/users/42"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "No such user" })),
            )
            .mount(&server)
            .await;

        let err = transport(&server.uri()).delete("/users/42").await.unwrap_err();
        assert_eq!(err.code, "not_found");
        assert_eq!(err.message, "No such user");
    }

    #[tokio::test]
    async fn slow_upstream_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1_000)))
            .mount(&server)
            .await;

        let err = transport(&server.uri())
            .get::<JsonValue>("slow", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code, "timeout");
    }

    #[test]
    fn invalid_base_is_not_configured() {
        let result = HttpTransport::new(
            ProviderTag::Slack,
            "not a url",
            "t",
            &HttpSettings::default(),
            translate,
        );
        assert!(matches!(result, Err(AdapterError::NotConfigured { .. })));
    }

    #[test]
    fn status_names() {
        assert_eq!(status_code_name(StatusCode::TOO_MANY_REQUESTS), "rate_limited");
        assert_eq!(status_code_name(StatusCode::BAD_GATEWAY), "upstream_unavailable");
        assert_eq!(status_code_name(StatusCode::IM_A_TEAPOT), "http_418");
        assert_eq!(snippet(&"a".repeat(300)).len(), 203);
    }
}
