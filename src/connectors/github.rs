//! GitHub adapter
//!
//! Membership is organization-scoped: new identities are organization
//! invitations sent to the employee's email, and the invitation id GitHub
//! returns becomes the canonical account id. Teams are the group concept.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
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

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct GitHubMember {
    id: u64,
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubInvitation {
    id: u64,
    #[serde(default)]
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubTeam {
    id: u64,
    slug: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Translate `{"message", "errors": [...]}` bodies
fn translate_error(status: StatusCode, body: &JsonValue) -> ProviderError {
    let mut message = body["message"]
        .as_str()
        .map(snippet)
        .unwrap_or_else(|| format!("GitHub returned {}", status));

    if let Some(detail) = body["errors"]
        .as_array()
        .and_then(|errors| errors.first())
        .and_then(|first| serde_json::from_value::<GitHubErrorDetail>(first.clone()).ok())
        && let Some(extra) = detail.message.or(detail.code)
    {
        message = format!("{}: {}", message, extra);
    }

    // Secondary rate limits arrive as 403 with an explanatory message
    let code = if status == StatusCode::FORBIDDEN && message.to_lowercase().contains("rate limit")
    {
        "rate_limited".to_string()
    } else {
        status_code_name(status)
    };
    ProviderError::new(code, message)
}

pub struct GitHubAdapter {
    transport: HttpTransport,
    org: String,
}

impl GitHubAdapter {
    pub fn new(settings: &ProviderSettings, secrets: &PlainSecretBundle) -> Result<Self, AdapterError> {
        let org = settings
            .github_org
            .clone()
            .filter(|org| !org.trim().is_empty())
            .ok_or_else(|| {
                AdapterError::not_configured(ProviderTag::Github, "GitHub organization is not set")
            })?;
        let token = secrets.bot_token.as_deref().ok_or_else(|| {
            AdapterError::not_configured(
                ProviderTag::Github,
                "bot_token (installation or admin token) is required",
            )
        })?;
        let transport = HttpTransport::new(
            ProviderTag::Github,
            &settings.github_api_base,
            token,
            &settings.http,
            translate_error,
        )?;
        Ok(Self { transport, org })
    }

    async fn team_ids(&self, slugs: &[String]) -> Result<Vec<u64>, AdapterError> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let teams: Vec<GitHubTeam> = self
            .transport
            .get(&format!("orgs/{}/teams", self.org), &[("per_page", "100")])
            .await?;
        Ok(teams
            .into_iter()
            .filter(|team| slugs.contains(&team.slug))
            .map(|team| team.id)
            .collect())
    }
}

#[async_trait]
impl ProviderAdapter for GitHubAdapter {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Github
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, AdapterError> {
        let mut identities = Vec::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let members: Vec<GitHubMember> = self
                .transport
                .get(
                    &format!("orgs/{}/members", self.org),
                    &[("per_page", "100"), ("page", page_str.as_str())],
                )
                .await?;
            let fetched = members.len();

            identities.extend(members.into_iter().map(|member| Identity {
                external_id: member.id.to_string(),
                email: None,
                display_name: Some(member.login),
                active: true,
            }));

            if fetched < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(identities)
    }

    async fn create_identity(
        &self,
        spec: &IdentitySpec,
    ) -> Result<ExternalAccountRef, AdapterError> {
        let (role, teams) = match &spec.metadata {
            AccountMetadata::Github { role, teams, .. } => (role.as_str(), teams.as_slice()),
            _ => ("member", &[][..]),
        };
        let team_ids = self.team_ids(teams).await?;

        // Team maintainers still join the org as direct members
        let org_role = if role == "admin" { "admin" } else { "direct_member" };

        let invitation: GitHubInvitation = self
            .transport
            .post(
                &format!("orgs/{}/invitations", self.org),
                &json!({
                    "email": spec.email,
                    "role": org_role,
                    "team_ids": team_ids,
                }),
            )
            .await?;

        Ok(ExternalAccountRef {
            account_id: invitation.id.to_string(),
            login: invitation.login,
        })
    }

    async fn deactivate_identity(&self, external_id: &str) -> Result<(), AdapterError> {
        self.transport
            .delete(&format!("orgs/{}/invitations/{}", self.org, external_id))
            .await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AdapterError> {
        let teams: Vec<GitHubTeam> = self
            .transport
            .get(&format!("orgs/{}/teams", self.org), &[("per_page", "100")])
            .await?;
        Ok(teams
            .into_iter()
            .map(|team| Group {
                id: team.slug,
                name: team.name,
            })
            .collect())
    }

    async fn create_group(&self, name: &str) -> Result<Group, AdapterError> {
        let team: GitHubTeam = self
            .transport
            .post(
                &format!("orgs/{}/teams", self.org),
                &json!({ "name": name, "privacy": "closed" }),
            )
            .await?;
        Ok(Group {
            id: team.slug,
            name: team.name,
        })
    }

    /// `external_id` here is the member's login; team membership is by username
    async fn add_member_to_group(
        &self,
        group_id: &str,
        external_id: &str,
    ) -> Result<(), AdapterError> {
        let _: JsonValue = self
            .transport
            .put(
                &format!(
                    "orgs/{}/teams/{}/memberships/{}",
                    self.org, group_id, external_id
                ),
                &json!({ "role": "member" }),
            )
            .await?;
        Ok(())
    }
}

fn build(
    settings: &ProviderSettings,
    secrets: &PlainSecretBundle,
) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
    Ok(Arc::new(GitHubAdapter::new(settings, secrets)?))
}

/// Register the GitHub adapter with the registry
pub fn register(registry: &mut Registry) {
    let metadata = ProviderMetadata {
        provider: ProviderTag::Github,
        display_name: "GitHub".to_string(),
        auth_type: AuthType::Bearer,
        scopes: vec!["admin:org".to_string()],
        capabilities: Capability::with_groups(),
        external_id_rule: IdentityMapper::standard()
            .rule(ProviderTag::Github)
            .unwrap_or(ExternalIdRule::AssignedByProvider),
    };
    registry.register(metadata, build);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::http::HttpSettings;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> GitHubAdapter {
        let settings = ProviderSettings {
            http: HttpSettings::default(),
            google_api_base: server.uri(),
            slack_api_base: server.uri(),
            slack_scim_base: server.uri(),
            github_api_base: server.uri(),
            github_org: Some("acme".to_string()),
            microsoft_graph_base: server.uri(),
        };
        let secrets = PlainSecretBundle {
            client_id: "Iv1.client".to_string(),
            client_secret: "secret".to_string(),
            signing_secret: "webhook".to_string(),
            bot_token: Some("ghs_token".to_string()),
            user_token: None,
        };
        GitHubAdapter::new(&settings, &secrets).expect("adapter builds")
    }

    fn spec() -> IdentitySpec {
        IdentitySpec {
            employee_id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            account_id: "pending:github:x".to_string(),
            metadata: AccountMetadata::Github {
                role: "member".to_string(),
                teams: vec!["engineering".to_string()],
                login: None,
            },
        }
    }

    #[tokio::test]
    async fn invitation_id_becomes_account_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 11, "slug": "engineering", "name": "Engineering" },
                { "id": 12, "slug": "sales", "name": "Sales" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/acme/invitations"))
            .and(body_partial_json(json!({
                "email": "ada@example.com",
                "role": "direct_member",
                "team_ids": [11]
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "id": 4242, "login": null })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let created = adapter(&server).create_identity(&spec()).await.unwrap();
        assert_eq!(created.account_id, "4242");
        assert_eq!(created.login, None);
    }

    #[tokio::test]
    async fn validation_errors_include_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/orgs/acme/invitations"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{ "code": "already_exists", "message": "Invitee is already a part of this organization" }]
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).create_identity(&spec()).await.unwrap_err();
        let AdapterError::Provider(provider_error) = err else {
            panic!("expected provider error");
        };
        assert_eq!(provider_error.code, "invalid_request");
        assert!(provider_error.message.contains("already a part"));
    }

    #[tokio::test]
    async fn secondary_rate_limit_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/members"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "You have exceeded a secondary rate limit."
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).list_identities().await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Provider(ProviderError { ref code, .. }) if code == "rate_limited"
        ));
    }

    #[tokio::test]
    async fn lists_members_until_short_page() {
        let server = MockServer::start().await;
        let full_page: Vec<JsonValue> = (0..100)
            .map(|i| json!({ "id": i, "login": format!("user{}", i) }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/orgs/acme/members"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/members"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "id": 500, "login": "last" }])),
            )
            .mount(&server)
            .await;

        let identities = adapter(&server).list_identities().await.unwrap();
        assert_eq!(identities.len(), 101);
        assert_eq!(identities[100].external_id, "500");
    }

    #[tokio::test]
    async fn deactivation_cancels_invitation() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orgs/acme/invitations/4242"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server).deactivate_identity("4242").await.unwrap();
    }
}
