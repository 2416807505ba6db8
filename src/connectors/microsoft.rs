//! Microsoft 365 adapter
//!
//! Uses Microsoft Graph with an application access token. Identities are
//! keyed by user principal name, which Graph accepts anywhere a user id is.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::connectors::http::{HttpTransport, snippet, status_code_name};
use crate::connectors::registry::{ProviderSettings, Registry};
use crate::connectors::{
    AdapterError, AuthType, Capability, ExternalAccountRef, Group, Identity, IdentitySpec,
    ProviderAdapter, ProviderError, ProviderMetadata,
};
use crate::crypto::PlainSecretBundle;
use crate::identity::{ExternalIdRule, IdentityMapper, local_part_handle};
use crate::models::ProviderTag;
use crate::models::provider_account::AccountMetadata;

pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    user_principal_name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    account_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphGroup {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphPage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

/// Translate `{"error": {"code", "message"}}` bodies
fn translate_error(status: StatusCode, body: &JsonValue) -> ProviderError {
    let error = &body["error"];
    let message = error["message"]
        .as_str()
        .map(snippet)
        .unwrap_or_else(|| format!("Microsoft Graph returned {}", status));
    let code = match error["code"].as_str() {
        Some("Request_ResourceNotFound") => "not_found".to_string(),
        Some("Authorization_RequestDenied") => "forbidden".to_string(),
        Some("InvalidAuthenticationToken") => "unauthorized".to_string(),
        _ => status_code_name(status),
    };
    ProviderError::new(code, message)
}

pub struct MicrosoftAdapter {
    transport: HttpTransport,
    graph_base: String,
}

impl MicrosoftAdapter {
    pub fn new(settings: &ProviderSettings, secrets: &PlainSecretBundle) -> Result<Self, AdapterError> {
        let token = secrets.bot_token.as_deref().ok_or_else(|| {
            AdapterError::not_configured(
                ProviderTag::Microsoft,
                "bot_token (Graph application token) is required",
            )
        })?;
        let transport = HttpTransport::new(
            ProviderTag::Microsoft,
            &settings.microsoft_graph_base,
            token,
            &settings.http,
            translate_error,
        )?;
        Ok(Self {
            transport,
            graph_base: settings.microsoft_graph_base.trim_end_matches('/').to_string(),
        })
    }

    /// Follow `@odata.nextLink` by re-issuing the relative path it encodes
    fn next_path(&self, next_link: &str) -> Option<String> {
        next_link
            .strip_prefix(&self.graph_base)
            .map(|rest| rest.trim_start_matches('/').to_string())
    }
}

#[async_trait]
impl ProviderAdapter for MicrosoftAdapter {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Microsoft
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, AdapterError> {
        let mut identities = Vec::new();
        let mut page: GraphPage<GraphUser> = self
            .transport
            .get(
                "users",
                &[(
                    "$select",
                    "id,displayName,mail,userPrincipalName,accountEnabled",
                )],
            )
            .await?;

        loop {
            identities.extend(page.value.into_iter().map(|user| Identity {
                external_id: user.user_principal_name.to_lowercase(),
                email: user.mail,
                display_name: user.display_name.or(Some(user.id)),
                active: user.account_enabled.unwrap_or(true),
            }));

            let Some(next) = page.next_link.as_deref().and_then(|link| self.next_path(link))
            else {
                break;
            };
            // nextLink already carries its query string
            page = self.transport.get(&next, &[]).await?;
        }

        Ok(identities)
    }

    async fn create_identity(
        &self,
        spec: &IdentitySpec,
    ) -> Result<ExternalAccountRef, AdapterError> {
        let job_title = match &spec.metadata {
            AccountMetadata::Microsoft { job_title, .. } => job_title.clone(),
            _ => String::new(),
        };

        let body = json!({
            "accountEnabled": true,
            "displayName": format!("{} {}", spec.first_name, spec.last_name),
            "givenName": spec.first_name,
            "surname": spec.last_name,
            "mailNickname": local_part_handle(&spec.account_id),
            "userPrincipalName": spec.account_id,
            "jobTitle": job_title,
            "passwordProfile": {
                "forceChangePasswordNextSignIn": true,
                "password": format!("{}!Aa1", Uuid::new_v4().simple()),
            },
        });

        let created: GraphUser = self.transport.post("users", &body).await?;
        tracing::debug!(graph_user_id = %created.id, "Created Microsoft 365 user");

        Ok(ExternalAccountRef {
            account_id: created.user_principal_name.to_lowercase(),
            login: None,
        })
    }

    async fn deactivate_identity(&self, external_id: &str) -> Result<(), AdapterError> {
        let _: JsonValue = self
            .transport
            .patch(
                &format!("users/{}", external_id),
                &json!({ "accountEnabled": false }),
            )
            .await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AdapterError> {
        let page: GraphPage<GraphGroup> = self
            .transport
            .get("groups", &[("$select", "id,displayName")])
            .await?;
        Ok(page
            .value
            .into_iter()
            .map(|group| Group {
                name: group.display_name.unwrap_or_else(|| group.id.clone()),
                id: group.id,
            })
            .collect())
    }

    async fn create_group(&self, name: &str) -> Result<Group, AdapterError> {
        let created: GraphGroup = self
            .transport
            .post(
                "groups",
                &json!({
                    "displayName": name,
                    "mailEnabled": false,
                    "mailNickname": crate::identity::slug(name),
                    "securityEnabled": true,
                }),
            )
            .await?;
        Ok(Group {
            name: created.display_name.unwrap_or_else(|| name.to_string()),
            id: created.id,
        })
    }

    async fn add_member_to_group(
        &self,
        group_id: &str,
        external_id: &str,
    ) -> Result<(), AdapterError> {
        let user: GraphUser = self
            .transport
            .get(&format!("users/{}", external_id), &[("$select", "id,userPrincipalName")])
            .await?;
        let _: JsonValue = self
            .transport
            .post(
                &format!("groups/{}/members/$ref", group_id),
                &json!({
                    "@odata.id": format!("{}/directoryObjects/{}", self.graph_base, user.id)
                }),
            )
            .await?;
        Ok(())
    }
}

fn build(
    settings: &ProviderSettings,
    secrets: &PlainSecretBundle,
) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
    Ok(Arc::new(MicrosoftAdapter::new(settings, secrets)?))
}

/// Register the Microsoft 365 adapter with the registry
pub fn register(registry: &mut Registry) {
    let metadata = ProviderMetadata {
        provider: ProviderTag::Microsoft,
        display_name: "Microsoft 365".to_string(),
        auth_type: AuthType::OAuth2,
        scopes: vec![
            "User.ReadWrite.All".to_string(),
            "Group.ReadWrite.All".to_string(),
        ],
        capabilities: Capability::with_groups(),
        external_id_rule: IdentityMapper::standard()
            .rule(ProviderTag::Microsoft)
            .unwrap_or(ExternalIdRule::Email),
    };
    registry.register(metadata, build);
}
