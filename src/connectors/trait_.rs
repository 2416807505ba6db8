//! Provider adapter trait definition
//!
//! Defines the uniform capability surface every external SaaS provider
//! implements, plus the factory seam through which adapters are built from an
//! explicit secret bundle.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::crypto::PlainSecretBundle;
use crate::models::ProviderTag;
use crate::models::provider_account::AccountMetadata;

/// Failure reported by a provider, already translated from its wire shape
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[error("[{code}] {message}")]
pub struct ProviderError {
    /// Provider-agnostic error code, e.g. `unauthorized`, `rate_limited`, `timeout`
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: ProviderTag, after_ms: u64) -> Self {
        Self::new(
            "timeout",
            format!("{} did not respond within {}ms", provider, after_ms),
        )
    }

    pub fn unsupported(provider: ProviderTag, operation: &str) -> Self {
        Self::new(
            "unsupported",
            format!("{} does not support {}", provider, operation),
        )
    }
}

/// Adapter error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Credentials for the provider are missing; callers present a setup flow
    #[error("provider '{provider}' is not configured: {details}")]
    NotConfigured {
        provider: ProviderTag,
        details: String,
    },
}

impl AdapterError {
    pub fn not_configured<S: Into<String>>(provider: ProviderTag, details: S) -> Self {
        AdapterError::NotConfigured {
            provider,
            details: details.into(),
        }
    }
}

/// Identity as listed by a provider roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub active: bool,
}

/// Group, channel, or team as listed by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Group {
    pub id: String,
    pub name: String,
}

/// Everything an adapter needs to create one identity
#[derive(Debug, Clone)]
pub struct IdentitySpec {
    pub employee_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Account id computed by the identity mapper; a placeholder for
    /// providers that assign their own ids
    pub account_id: String,
    pub metadata: AccountMetadata,
}

/// Reference to a created identity, as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccountRef {
    /// Canonical account id assigned or confirmed by the provider
    pub account_id: String,
    /// Provider-assigned login or handle, when it differs from the id
    pub login: Option<String>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderTag;

    /// Read the provider's user roster.
    async fn list_identities(&self) -> Result<Vec<Identity>, AdapterError>;

    /// Create an identity and return the provider's reference to it.
    async fn create_identity(&self, spec: &IdentitySpec)
    -> Result<ExternalAccountRef, AdapterError>;

    /// Deactivate (suspend or remove) an identity by its external id.
    async fn deactivate_identity(&self, external_id: &str) -> Result<(), AdapterError>;

    async fn list_groups(&self) -> Result<Vec<Group>, AdapterError> {
        Err(ProviderError::unsupported(self.provider(), "groups").into())
    }

    async fn create_group(&self, name: &str) -> Result<Group, AdapterError> {
        let _ = name;
        Err(ProviderError::unsupported(self.provider(), "group creation").into())
    }

    async fn add_member_to_group(
        &self,
        group_id: &str,
        external_id: &str,
    ) -> Result<(), AdapterError> {
        let _ = (group_id, external_id);
        Err(ProviderError::unsupported(self.provider(), "group membership").into())
    }
}

/// Builds adapters from an explicit, already decrypted secret bundle.
///
/// Adapters never read credentials from ambient process state; the engine
/// decrypts the active bundle and hands it to the factory per call.
pub trait AdapterFactory: Send + Sync {
    fn build(
        &self,
        provider: ProviderTag,
        secrets: &PlainSecretBundle,
    ) -> Result<Arc<dyn ProviderAdapter>, AdapterError>;
}
