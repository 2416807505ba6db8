//! Identity mapper
//!
//! Computes the external account id and provisioning metadata for an
//! `(employee, provider)` pair. Everything provider-specific lives in one
//! table keyed by provider tag; supporting a new provider means adding one
//! entry there, nothing in the provisioner changes.
//!
//! Mapping is pure and deterministic: no randomness and no I/O. Providers
//! that only know their account id after creation get a deterministic
//! placeholder which the adapter's creation response must replace.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::connectors::ExternalAccountRef;
use crate::error::EngineError;
use crate::models::ProviderTag;
use crate::models::employee::Model as Employee;
use crate::models::provider_account::AccountMetadata;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

static NON_HANDLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9._-]+").expect("valid regex"));

const LEADERSHIP_MARKERS: &[&str] = &[
    "chief",
    "director",
    "head",
    "lead",
    "manager",
    "vice president",
    "vp",
];

/// How a provider's external account id is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExternalIdRule {
    /// Normalized (trimmed, lowercased) work email
    Email,
    /// Normalized local part of the work email
    EmailLocalPart,
    /// Assigned by the provider at creation; a placeholder until then
    AssignedByProvider,
}

type MetadataFn = fn(&Employee) -> AccountMetadata;

#[derive(Clone, Copy)]
struct MappingEntry {
    rule: ExternalIdRule,
    metadata: MetadataFn,
}

/// Result of mapping one employee onto one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedIdentity {
    pub provider: ProviderTag,
    pub account_id: String,
    pub metadata: AccountMetadata,
    /// `account_id` is a placeholder the adapter response must overwrite
    pub is_placeholder: bool,
}

/// Provider-keyed mapping table
#[derive(Clone)]
pub struct IdentityMapper {
    entries: HashMap<ProviderTag, MappingEntry>,
}

static STANDARD: LazyLock<IdentityMapper> = LazyLock::new(|| {
    let mut mapper = IdentityMapper::empty();
    mapper.register(ProviderTag::Google, ExternalIdRule::Email, google_metadata);
    mapper.register(ProviderTag::Slack, ExternalIdRule::EmailLocalPart, slack_metadata);
    mapper.register(
        ProviderTag::Github,
        ExternalIdRule::AssignedByProvider,
        github_metadata,
    );
    mapper.register(
        ProviderTag::Microsoft,
        ExternalIdRule::Email,
        microsoft_metadata,
    );
    mapper
});

impl Default for IdentityMapper {
    fn default() -> Self {
        STANDARD.clone()
    }
}

impl IdentityMapper {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The mapper with every built-in provider registered
    pub fn standard() -> &'static IdentityMapper {
        &STANDARD
    }

    pub fn register(&mut self, provider: ProviderTag, rule: ExternalIdRule, metadata: MetadataFn) {
        self.entries.insert(provider, MappingEntry { rule, metadata });
    }

    pub fn rule(&self, provider: ProviderTag) -> Option<ExternalIdRule> {
        self.entries.get(&provider).map(|entry| entry.rule)
    }

    pub fn map(&self, employee: &Employee, provider: ProviderTag) -> Result<MappedIdentity, EngineError> {
        let entry = self.entries.get(&provider).ok_or_else(|| {
            EngineError::Validation(format!("no identity mapping registered for {}", provider))
        })?;

        let email = normalize_email(&employee.email);
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::Validation(format!(
                "employee {} has no usable email",
                employee.id
            )));
        }

        let account_id = match entry.rule {
            ExternalIdRule::Email => email,
            ExternalIdRule::EmailLocalPart => local_part_handle(&email),
            ExternalIdRule::AssignedByProvider => placeholder_id(provider, employee),
        };

        Ok(MappedIdentity {
            provider,
            account_id,
            metadata: (entry.metadata)(employee),
            is_placeholder: entry.rule == ExternalIdRule::AssignedByProvider,
        })
    }

    /// Merge the adapter's creation response into the mapped identity.
    ///
    /// For provider-assigned ids the response must carry a real id; a missing
    /// or placeholder id is a provider error. For derived ids the mapped id
    /// stays authoritative.
    pub fn reconcile(
        &self,
        mapped: MappedIdentity,
        created: &ExternalAccountRef,
    ) -> Result<(String, AccountMetadata), EngineError> {
        if !mapped.is_placeholder {
            return Ok((mapped.account_id, mapped.metadata));
        }

        let canonical = created.account_id.trim();
        if canonical.is_empty() || canonical == mapped.account_id {
            return Err(EngineError::Provider(
                crate::connectors::ProviderError::new(
                    "malformed_response",
                    format!(
                        "{} did not return an account id for the new identity",
                        mapped.provider
                    ),
                ),
            ));
        }

        let metadata = match mapped.metadata {
            AccountMetadata::Github { role, teams, .. } => AccountMetadata::Github {
                role,
                teams,
                login: created.login.clone(),
            },
            other => other,
        };

        Ok((canonical.to_string(), metadata))
    }
}

/// Deterministic placeholder for providers that assign their own ids
pub fn placeholder_id(provider: ProviderTag, employee: &Employee) -> String {
    format!("pending:{}:{}", provider, employee.id)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Handle built from the email local part: lowercase, `[a-z0-9._-]` only
pub fn local_part_handle(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let handle = NON_HANDLE_CHARS.replace_all(&local.to_lowercase(), "-").to_string();
    handle.trim_matches('-').chars().take(80).collect()
}

pub fn slug(value: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(&value.trim().to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

fn is_leadership(position: &str) -> bool {
    let position = position.to_lowercase();
    position
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| LEADERSHIP_MARKERS.contains(&word))
        || position.contains("vice president")
}

fn department_slug(employee: &Employee) -> String {
    let slug = slug(&employee.department);
    if slug.is_empty() {
        "general".to_string()
    } else {
        slug
    }
}

fn google_metadata(employee: &Employee) -> AccountMetadata {
    let department = employee.department.trim();
    AccountMetadata::Google {
        org_unit: if department.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", department)
        },
        license: if is_leadership(&employee.position) {
            "Google Workspace Business Plus".to_string()
        } else {
            "Google Workspace Business Standard".to_string()
        },
        groups: vec![
            "all-staff".to_string(),
            format!("dept-{}", department_slug(employee)),
        ],
    }
}

fn slack_metadata(employee: &Employee) -> AccountMetadata {
    AccountMetadata::Slack {
        display_name: local_part_handle(&normalize_email(&employee.email)),
        title: employee.position.trim().to_string(),
        channels: vec![
            "general".to_string(),
            "announcements".to_string(),
            department_slug(employee),
        ],
    }
}

fn github_metadata(employee: &Employee) -> AccountMetadata {
    AccountMetadata::Github {
        role: if is_leadership(&employee.position) {
            "maintainer".to_string()
        } else {
            "member".to_string()
        },
        teams: vec![department_slug(employee)],
        login: None,
    }
}

fn microsoft_metadata(employee: &Employee) -> AccountMetadata {
    let department = employee.department.trim();
    AccountMetadata::Microsoft {
        license: if is_leadership(&employee.position) {
            "Microsoft 365 E5".to_string()
        } else {
            "Microsoft 365 E3".to_string()
        },
        job_title: employee.position.trim().to_string(),
        groups: vec![
            "All Employees".to_string(),
            if department.is_empty() {
                "General".to_string()
            } else {
                department.to_string()
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn employee(email: &str, department: &str, position: &str) -> Employee {
        let now = Utc::now().into();
        Employee {
            id: Uuid::from_u128(7),
            email: email.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            department: department.to_string(),
            position: position.to_string(),
            manager_id: None,
            hired_at: now,
            terminated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_email_rule_normalizes() {
        let mapped = IdentityMapper::standard()
            .map(
                &employee("  Ada.Lovelace@Example.COM ", "Engineering", "Engineer"),
                ProviderTag::Google,
            )
            .unwrap();
        assert_eq!(mapped.account_id, "ada.lovelace@example.com");
        assert!(!mapped.is_placeholder);
    }

    #[test]
    fn test_local_part_rule_builds_handle() {
        let mapped = IdentityMapper::standard()
            .map(
                &employee("Ada+Ops@example.com", "Engineering", "Engineer"),
                ProviderTag::Slack,
            )
            .unwrap();
        assert_eq!(mapped.account_id, "ada-ops");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let e = employee("ada@example.com", "Sales", "Account Executive");
        for provider in [
            ProviderTag::Google,
            ProviderTag::Slack,
            ProviderTag::Github,
            ProviderTag::Microsoft,
        ] {
            let first = IdentityMapper::standard().map(&e, provider).unwrap();
            let second = IdentityMapper::standard().map(&e, provider).unwrap();
            assert_eq!(first, second, "{provider}");
            assert_eq!(first.metadata.provider(), provider);
        }
    }

    #[test]
    fn test_provider_assigned_ids_use_placeholder() {
        let e = employee("ada@example.com", "Engineering", "Engineer");
        let mapped = IdentityMapper::standard()
            .map(&e, ProviderTag::Github)
            .unwrap();
        assert!(mapped.is_placeholder);
        assert_eq!(
            mapped.account_id,
            format!("pending:github:{}", Uuid::from_u128(7))
        );
    }

    #[test]
    fn test_reconcile_replaces_placeholder_and_sets_login() {
        let mapper = IdentityMapper::standard();
        let e = employee("ada@example.com", "Engineering", "Engineer");
        let mapped = mapper.map(&e, ProviderTag::Github).unwrap();

        let (account_id, metadata) = mapper
            .reconcile(
                mapped,
                &ExternalAccountRef {
                    account_id: "981273".to_string(),
                    login: Some("ada-l".to_string()),
                },
            )
            .unwrap();
        assert_eq!(account_id, "981273");
        assert!(matches!(
            metadata,
            AccountMetadata::Github { login: Some(ref l), .. } if l == "ada-l"
        ));
    }

    #[test]
    fn test_reconcile_rejects_missing_canonical_id() {
        let mapper = IdentityMapper::standard();
        let e = employee("ada@example.com", "Engineering", "Engineer");
        let mapped = mapper.map(&e, ProviderTag::Github).unwrap();
        let placeholder = mapped.account_id.clone();

        let result = mapper.reconcile(
            mapped,
            &ExternalAccountRef {
                account_id: placeholder,
                login: None,
            },
        );
        assert!(matches!(result, Err(EngineError::Provider(_))));
    }

    #[test]
    fn test_reconcile_keeps_derived_ids() {
        let mapper = IdentityMapper::standard();
        let e = employee("ada@example.com", "Engineering", "Engineer");
        let mapped = mapper.map(&e, ProviderTag::Microsoft).unwrap();

        let (account_id, _) = mapper
            .reconcile(
                mapped,
                &ExternalAccountRef {
                    account_id: "0f9e-guid".to_string(),
                    login: None,
                },
            )
            .unwrap();
        assert_eq!(account_id, "ada@example.com");
    }

    #[test]
    fn test_metadata_defaults_follow_department_and_position() {
        let mapper = IdentityMapper::standard();
        let lead = employee("bo@example.com", "Customer Success", "Head of Support");
        let ic = employee("cy@example.com", "Customer Success", "Support Engineer");

        let google = mapper.map(&lead, ProviderTag::Google).unwrap().metadata;
        assert_eq!(
            google,
            AccountMetadata::Google {
                org_unit: "/Customer Success".to_string(),
                license: "Google Workspace Business Plus".to_string(),
                groups: vec!["all-staff".to_string(), "dept-customer-success".to_string()],
            }
        );

        let slack = mapper.map(&ic, ProviderTag::Slack).unwrap().metadata;
        assert_eq!(
            slack.memberships(),
            ["general", "announcements", "customer-success"].map(String::from)
        );

        let github = mapper.map(&ic, ProviderTag::Github).unwrap().metadata;
        assert!(matches!(github, AccountMetadata::Github { ref role, .. } if role == "member"));
    }

    #[test]
    fn test_unregistered_provider_and_bad_email_are_validation_errors() {
        let e = employee("ada@example.com", "Eng", "Engineer");
        assert!(matches!(
            IdentityMapper::empty().map(&e, ProviderTag::Slack),
            Err(EngineError::Validation(_))
        ));

        let bad = employee("   ", "Eng", "Engineer");
        assert!(matches!(
            IdentityMapper::standard().map(&bad, ProviderTag::Google),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_leadership_detection_matches_whole_words() {
        assert!(is_leadership("Engineering Manager"));
        assert!(is_leadership("VP, Sales"));
        assert!(is_leadership("Vice President of Finance"));
        assert!(!is_leadership("Headless CMS Developer"));
        assert!(!is_leadership("Plead Analyst"));
    }
}
