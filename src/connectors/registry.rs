//! Provider registry
//!
//! Maps each provider tag to its metadata and adapter constructor. The
//! registry is the production `AdapterFactory`: it builds an adapter per call
//! from the secret bundle it is given, never from process state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::connectors::http::HttpSettings;
use crate::connectors::{
    AdapterError, AdapterFactory, ProviderAdapter, ProviderMetadata, github, google_workspace,
    microsoft, slack,
};
use crate::crypto::PlainSecretBundle;
use crate::models::ProviderTag;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider '{name}' not found")]
    ProviderNotFound { name: String },
}

/// Endpoint and transport settings for every adapter
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub http: HttpSettings,
    pub google_api_base: String,
    pub slack_api_base: String,
    pub slack_scim_base: String,
    pub github_api_base: String,
    /// Organization new GitHub members are invited to
    pub github_org: Option<String>,
    pub microsoft_graph_base: String,
}

impl ProviderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: HttpSettings {
                timeout: config.provider_timeout(),
            },
            google_api_base: config.google_api_base.clone(),
            slack_api_base: config.slack_api_base.clone(),
            slack_scim_base: config.slack_scim_base.clone(),
            github_api_base: config.github_api_base.clone(),
            github_org: config.github_org.clone(),
            microsoft_graph_base: config.microsoft_graph_base.clone(),
        }
    }
}

/// Adapter constructor stored per provider
pub type AdapterBuilder = fn(
    &ProviderSettings,
    &PlainSecretBundle,
) -> Result<Arc<dyn ProviderAdapter>, AdapterError>;

/// Provider registry that stores adapter builders and their metadata
#[derive(Clone)]
pub struct Registry {
    settings: ProviderSettings,
    builders: HashMap<ProviderTag, AdapterBuilder>,
    metadata: HashMap<ProviderTag, ProviderMetadata>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            builders: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Registry with every built-in provider registered
    pub fn with_builtin_providers(settings: ProviderSettings) -> Self {
        let mut registry = Self::new(settings);
        google_workspace::register(&mut registry);
        slack::register(&mut registry);
        github::register(&mut registry);
        microsoft::register(&mut registry);
        registry
    }

    /// Register a provider with its adapter builder and metadata
    pub fn register(&mut self, metadata: ProviderMetadata, builder: AdapterBuilder) {
        let provider = metadata.provider;
        self.builders.insert(provider, builder);
        self.metadata.insert(provider, metadata);
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn is_registered(&self, provider: ProviderTag) -> bool {
        self.builders.contains_key(&provider)
    }

    /// Get metadata for all providers, sorted by tag for stable ordering
    pub fn list_metadata(&self) -> Vec<ProviderMetadata> {
        let mut metadata: Vec<_> = self.metadata.values().cloned().collect();
        metadata.sort_by_key(|entry| entry.provider);
        metadata
    }

    /// Get metadata for a specific provider
    pub fn get_metadata(&self, provider: ProviderTag) -> Result<&ProviderMetadata, RegistryError> {
        self.metadata
            .get(&provider)
            .ok_or_else(|| RegistryError::ProviderNotFound {
                name: provider.to_string(),
            })
    }
}

impl AdapterFactory for Registry {
    fn build(
        &self,
        provider: ProviderTag,
        secrets: &PlainSecretBundle,
    ) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
        let builder = self.builders.get(&provider).ok_or_else(|| {
            AdapterError::not_configured(provider, "no adapter registered for provider")
        })?;
        builder(&self.settings, secrets)
    }
}
