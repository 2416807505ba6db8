//! Slack adapter
//!
//! Roster and channel calls go through the Web API with the bot token.
//! Identity creation and deactivation go through SCIM with the user (admin)
//! token. Accounts are keyed by the Slack handle derived from the email
//! local part; SCIM ids are looked up by `userName` when needed.
//!
//! The Web API reports most failures as `200 {"ok": false, "error": "..."}`,
//! so every Web API response is checked for `ok` before it is decoded.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};

use crate::connectors::http::{HttpTransport, snippet, status_code_name};
use crate::connectors::registry::{ProviderSettings, Registry};
use crate::connectors::{
    AdapterError, AuthType, Capability, ExternalAccountRef, Group, Identity, IdentitySpec,
    ProviderAdapter, ProviderError, ProviderMetadata,
};
use crate::crypto::PlainSecretBundle;
use crate::identity::{ExternalIdRule, IdentityMapper};
use crate::models::ProviderTag;
use crate::models::provider_account::AccountMetadata;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_SLACK_SCIM_BASE: &str = "https://api.slack.com/scim/v2";

const SCIM_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

#[derive(Debug, Deserialize)]
struct SlackMember {
    id: String,
    name: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersList {
    #[serde(default)]
    members: Vec<SlackMember>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    channels: Vec<SlackChannel>,
}

#[derive(Debug, Deserialize)]
struct ChannelEnvelope {
    channel: SlackChannel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimUser {
    id: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScimList {
    #[serde(default)]
    resources: Vec<ScimUser>,
}

/// Translate SCIM `{"Errors": {"description", "code"}}` and HTTP-level failures
fn translate_error(status: StatusCode, body: &JsonValue) -> ProviderError {
    let message = body["Errors"]["description"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .map(snippet)
        .unwrap_or_else(|| format!("Slack returned {}", status));
    ProviderError::new(status_code_name(status), message)
}

/// Map Web API `error` strings onto provider-agnostic codes
fn web_api_error(error: &str) -> ProviderError {
    let code = match error {
        "invalid_auth" | "not_authed" | "token_revoked" | "account_inactive" => "unauthorized",
        "missing_scope" | "not_allowed_token_type" => "forbidden",
        "ratelimited" => "rate_limited",
        "user_not_found" | "channel_not_found" => "not_found",
        "name_taken" | "already_in_channel" => "conflict",
        _ => "provider_error",
    };
    ProviderError::new(code, format!("Slack API error: {}", error))
}

fn check_ok<T: DeserializeOwned>(body: JsonValue) -> Result<T, ProviderError> {
    if body["ok"].as_bool() != Some(true) {
        let error = body["error"].as_str().unwrap_or("unknown_error");
        return Err(web_api_error(error));
    }
    serde_json::from_value(body)
        .map_err(|e| ProviderError::new("malformed_response", e.to_string()))
}

pub struct SlackAdapter {
    web: Option<HttpTransport>,
    scim: Option<HttpTransport>,
}

impl SlackAdapter {
    pub fn new(settings: &ProviderSettings, secrets: &PlainSecretBundle) -> Result<Self, AdapterError> {
        if secrets.bot_token.is_none() && secrets.user_token.is_none() {
            return Err(AdapterError::not_configured(
                ProviderTag::Slack,
                "bot_token or user_token is required",
            ));
        }

        let web = secrets
            .bot_token
            .as_deref()
            .map(|token| {
                HttpTransport::new(
                    ProviderTag::Slack,
                    &settings.slack_api_base,
                    token,
                    &settings.http,
                    translate_error,
                )
            })
            .transpose()?;
        let scim = secrets
            .user_token
            .as_deref()
            .map(|token| {
                HttpTransport::new(
                    ProviderTag::Slack,
                    &settings.slack_scim_base,
                    token,
                    &settings.http,
                    translate_error,
                )
            })
            .transpose()?;

        Ok(Self { web, scim })
    }

    fn web(&self) -> Result<&HttpTransport, AdapterError> {
        self.web.as_ref().ok_or_else(|| {
            AdapterError::not_configured(ProviderTag::Slack, "bot_token is required for Web API calls")
        })
    }

    fn scim(&self) -> Result<&HttpTransport, AdapterError> {
        self.scim.as_ref().ok_or_else(|| {
            AdapterError::not_configured(ProviderTag::Slack, "user_token is required for SCIM calls")
        })
    }

    async fn web_get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AdapterError> {
        let body: JsonValue = self.web()?.get(method, query).await?;
        Ok(check_ok(body)?)
    }

    async fn web_post<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &JsonValue,
    ) -> Result<T, AdapterError> {
        let body: JsonValue = self.web()?.post(method, payload).await?;
        Ok(check_ok(body)?)
    }

    /// Resolve a handle to its SCIM user id
    async fn scim_id(&self, handle: &str) -> Result<String, AdapterError> {
        let filter = format!("userName eq \"{}\"", handle);
        let list: ScimList = self.scim()?.get("Users", &[("filter", filter.as_str())]).await?;
        list.resources
            .into_iter()
            .find(|user| user.user_name.eq_ignore_ascii_case(handle))
            .map(|user| user.id)
            .ok_or_else(|| {
                ProviderError::new("not_found", format!("no Slack user with handle '{}'", handle))
                    .into()
            })
    }
}

#[async_trait]
impl ProviderAdapter for SlackAdapter {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Slack
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, AdapterError> {
        let mut identities = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = vec![("limit", "200")];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let page: UsersList = self.web_get("users.list", &query).await?;

            identities.extend(
                page.members
                    .into_iter()
                    .filter(|member| !member.is_bot)
                    .map(|member| Identity {
                        external_id: member.name,
                        email: member.profile.email,
                        display_name: member.profile.real_name.or(Some(member.id)),
                        active: !member.deleted,
                    }),
            );

            match page.response_metadata.and_then(|m| m.next_cursor) {
                Some(next) if !next.is_empty() => cursor = next,
                _ => break,
            }
        }

        Ok(identities)
    }

    async fn create_identity(
        &self,
        spec: &IdentitySpec,
    ) -> Result<ExternalAccountRef, AdapterError> {
        let title = match &spec.metadata {
            AccountMetadata::Slack { title, .. } => title.clone(),
            _ => String::new(),
        };

        let body = json!({
            "schemas": [SCIM_USER_SCHEMA],
            "userName": spec.account_id,
            "name": {
                "givenName": spec.first_name,
                "familyName": spec.last_name,
            },
            "emails": [{ "value": spec.email, "primary": true }],
            "title": title,
            "active": true,
        });

        let created: ScimUser = self.scim()?.post("Users", &body).await?;
        tracing::debug!(slack_user_id = %created.id, "Created Slack user");

        Ok(ExternalAccountRef {
            account_id: created.user_name,
            login: None,
        })
    }

    async fn deactivate_identity(&self, external_id: &str) -> Result<(), AdapterError> {
        let id = self.scim_id(external_id).await?;
        // SCIM DELETE deactivates; Slack never hard-deletes users
        self.scim()?.delete(&format!("Users/{}", id)).await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AdapterError> {
        let list: ChannelList = self
            .web_get(
                "conversations.list",
                &[("exclude_archived", "true"), ("limit", "1000")],
            )
            .await?;
        Ok(list
            .channels
            .into_iter()
            .map(|channel| Group {
                id: channel.id,
                name: channel.name,
            })
            .collect())
    }

    async fn create_group(&self, name: &str) -> Result<Group, AdapterError> {
        let created: ChannelEnvelope = self
            .web_post(
                "conversations.create",
                &json!({ "name": crate::identity::slug(name) }),
            )
            .await?;
        Ok(Group {
            id: created.channel.id,
            name: created.channel.name,
        })
    }

    async fn add_member_to_group(
        &self,
        group_id: &str,
        external_id: &str,
    ) -> Result<(), AdapterError> {
        let user_id = self.scim_id(external_id).await?;
        let _: JsonValue = self
            .web_post(
                "conversations.invite",
                &json!({ "channel": group_id, "users": user_id }),
            )
            .await?;
        Ok(())
    }
}

fn build(
    settings: &ProviderSettings,
    secrets: &PlainSecretBundle,
) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
    Ok(Arc::new(SlackAdapter::new(settings, secrets)?))
}

/// Register the Slack adapter with the registry
pub fn register(registry: &mut Registry) {
    let metadata = ProviderMetadata {
        provider: ProviderTag::Slack,
        display_name: "Slack".to_string(),
        auth_type: AuthType::Bearer,
        scopes: vec![
            "users:read".to_string(),
            "users:read.email".to_string(),
            "channels:manage".to_string(),
            "admin".to_string(),
        ],
        capabilities: Capability::with_groups(),
        external_id_rule: IdentityMapper::standard()
            .rule(ProviderTag::Slack)
            .unwrap_or(ExternalIdRule::EmailLocalPart),
    };
    registry.register(metadata, build);
}
