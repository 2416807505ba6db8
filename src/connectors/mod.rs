//! Connectors module
//!
//! This module provides the provider adapter layer including:
//! - The `ProviderAdapter` trait every SaaS provider implements
//! - Provider metadata and the registry that builds adapters from secrets
//! - The shared HTTP transport and the four built-in adapters

pub mod github;
pub mod google_workspace;
pub mod http;
pub mod metadata;
pub mod microsoft;
pub mod registry;
pub mod slack;
pub mod trait_;

pub use metadata::{AuthType, Capability, ProviderMetadata};
pub use registry::{ProviderSettings, Registry, RegistryError};
pub use trait_::{
    AdapterError, AdapterFactory, ExternalAccountRef, Group, Identity, IdentitySpec,
    ProviderAdapter, ProviderError,
};

pub use github::GitHubAdapter;
pub use google_workspace::GoogleWorkspaceAdapter;
pub use microsoft::MicrosoftAdapter;
pub use slack::SlackAdapter;
