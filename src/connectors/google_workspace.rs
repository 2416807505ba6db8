//! Google Workspace adapter
//!
//! Talks to the Admin SDK Directory API with a service-principal access token
//! taken from the bundle's `bot_token`. Identities are keyed by primary email.

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
use crate::identity::IdentityMapper;
use crate::models::ProviderTag;
use crate::models::provider_account::AccountMetadata;

pub const DEFAULT_GOOGLE_API_BASE: &str = "https://admin.googleapis.com/admin/directory/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUser {
    id: String,
    primary_email: String,
    #[serde(default)]
    name: Option<DirectoryName>,
    #[serde(default)]
    suspended: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryName {
    #[serde(default)]
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPage {
    #[serde(default)]
    users: Vec<DirectoryUser>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryGroup {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupPage {
    #[serde(default)]
    groups: Vec<DirectoryGroup>,
}

impl From<DirectoryGroup> for Group {
    fn from(group: DirectoryGroup) -> Self {
        let name = group
            .name
            .or(group.email)
            .unwrap_or_else(|| group.id.clone());
        Group { id: group.id, name }
    }
}

/// Translate `{"error": {"code", "message", "status"}}` bodies
fn translate_error(status: StatusCode, body: &JsonValue) -> ProviderError {
    let error = &body["error"];
    let message = error["message"]
        .as_str()
        .map(snippet)
        .unwrap_or_else(|| format!("Google API returned {}", status));
    let code = match error["status"].as_str() {
        Some("RESOURCE_EXHAUSTED") => "rate_limited".to_string(),
        Some("ALREADY_EXISTS") => "conflict".to_string(),
        _ => status_code_name(status),
    };
    ProviderError::new(code, message)
}

pub struct GoogleWorkspaceAdapter {
    transport: HttpTransport,
}

impl GoogleWorkspaceAdapter {
    pub fn new(
        settings: &ProviderSettings,
        secrets: &PlainSecretBundle,
    ) -> Result<Self, AdapterError> {
        let token = secrets.bot_token.as_deref().ok_or_else(|| {
            AdapterError::not_configured(ProviderTag::Google, "bot_token (admin access token) is required")
        })?;
        let transport = HttpTransport::new(
            ProviderTag::Google,
            &settings.google_api_base,
            token,
            &settings.http,
            translate_error,
        )?;
        Ok(Self { transport })
    }
}

#[async_trait]
impl ProviderAdapter for GoogleWorkspaceAdapter {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Google
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, AdapterError> {
        let mut identities = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("customer", "my_customer"), ("maxResults", "500")];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: UserPage = self.transport.get("users", &query).await?;

            identities.extend(page.users.into_iter().map(|user| Identity {
                external_id: user.primary_email.to_lowercase(),
                email: Some(user.primary_email),
                display_name: user.name.and_then(|n| n.full_name),
                active: !user.suspended,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(identities)
    }

    async fn create_identity(
        &self,
        spec: &IdentitySpec,
    ) -> Result<ExternalAccountRef, AdapterError> {
        let org_unit = match &spec.metadata {
            AccountMetadata::Google { org_unit, .. } => org_unit.clone(),
            _ => "/".to_string(),
        };

        let body = json!({
            "primaryEmail": spec.account_id,
            "name": {
                "givenName": spec.first_name,
                "familyName": spec.last_name,
            },
            "orgUnitPath": org_unit,
            // Initial password is random and must be changed at first login
            "password": Uuid::new_v4().simple().to_string(),
            "changePasswordAtNextLogin": true,
        });

        let created: DirectoryUser = self.transport.post("users", &body).await?;
        tracing::debug!(google_user_id = %created.id, "Created Google Workspace user");

        Ok(ExternalAccountRef {
            account_id: created.primary_email.to_lowercase(),
            login: None,
        })
    }

    async fn deactivate_identity(&self, external_id: &str) -> Result<(), AdapterError> {
        let _: JsonValue = self
            .transport
            .put(&format!("users/{}", external_id), &json!({ "suspended": true }))
            .await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AdapterError> {
        let page: GroupPage = self
            .transport
            .get("groups", &[("customer", "my_customer")])
            .await?;
        Ok(page.groups.into_iter().map(Group::from).collect())
    }

    async fn create_group(&self, name: &str) -> Result<Group, AdapterError> {
        let domain = self.domain_hint().await?;
        let email = format!("{}@{}", crate::identity::slug(name), domain);
        let created: DirectoryGroup = self
            .transport
            .post("groups", &json!({ "email": email, "name": name }))
            .await?;
        Ok(created.into())
    }

    async fn add_member_to_group(
        &self,
        group_id: &str,
        external_id: &str,
    ) -> Result<(), AdapterError> {
        let _: JsonValue = self
            .transport
            .post(
                &format!("groups/{}/members", group_id),
                &json!({ "email": external_id, "role": "MEMBER" }),
            )
            .await?;
        Ok(())
    }
}

impl GoogleWorkspaceAdapter {
    /// Primary domain of the customer, read from the first roster entry
    async fn domain_hint(&self) -> Result<String, AdapterError> {
        let page: UserPage = self
            .transport
            .get("users", &[("customer", "my_customer"), ("maxResults", "1")])
            .await?;
        page.users
            .first()
            .and_then(|user| user.primary_email.split('@').nth(1))
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::new("invalid_request", "cannot infer customer domain").into()
            })
    }
}

fn build(
    settings: &ProviderSettings,
    secrets: &PlainSecretBundle,
) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
    Ok(Arc::new(GoogleWorkspaceAdapter::new(settings, secrets)?))
}

/// Register the Google Workspace adapter with the registry
pub fn register(registry: &mut Registry) {
    let metadata = ProviderMetadata {
        provider: ProviderTag::Google,
        display_name: "Google Workspace".to_string(),
        auth_type: AuthType::OAuth2,
        scopes: vec![
            "https://www.googleapis.com/auth/admin.directory.user".to_string(),
            "https://www.googleapis.com/auth/admin.directory.group".to_string(),
        ],
        capabilities: Capability::with_groups(),
        external_id_rule: IdentityMapper::standard()
            .rule(ProviderTag::Google)
            .unwrap_or(crate::identity::ExternalIdRule::Email),
    };
    registry.register(metadata, build);
}
