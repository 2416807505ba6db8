//! # Data Models
//!
//! This module contains all the data models used throughout the provisioning engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod approval;
pub mod audit_log;
pub mod employee;
pub mod provider;
pub mod provider_account;
pub mod secret_bundle;
pub mod workflow_request;

pub use approval::Entity as Approval;
pub use audit_log::Entity as AuditLog;
pub use employee::Entity as Employee;
pub use provider::ProviderTag;
pub use provider_account::Entity as ProviderAccount;
pub use secret_bundle::Entity as SecretBundle;
pub use workflow_request::Entity as WorkflowRequest;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "provisioning-engine".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
