//! Secret bundle service
//!
//! Encrypts provider credentials through the [`Vault`] before they reach the
//! repository and decrypts the active bundle for adapters on demand. A
//! decryption failure is always an [`EngineError::Integrity`]; ciphertext is
//! never handed out as if it were plaintext.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::error::Elapsed;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, resource_ref};
use crate::connectors::{AdapterError, AdapterFactory};
use crate::crypto::{CipherBundle, PlainSecretBundle, Vault};
use crate::error::EngineError;
use crate::models::ProviderTag;
use crate::models::secret_bundle;
use crate::repositories::SecretBundleRepository;

const RESOURCE: &str = "secret_bundle";

const CONFIGURATION_CHECK: &str = "configuration";
const ROSTER_CHECK: &str = "list_identities";
const GROUPS_CHECK: &str = "list_groups";

/// Three-way result of a credential test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Success,
    Partial,
    Failed,
}

/// One adapter call made while testing credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TestCheck {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TestReport {
    pub provider: ProviderTag,
    pub outcome: TestOutcome,
    pub checks: Vec<TestCheck>,
}

impl TestReport {
    /// The roster call is the authentication check: without it nothing
    /// counts as usable. A failing group call only downgrades to partial.
    fn from_checks(provider: ProviderTag, checks: Vec<TestCheck>) -> Self {
        let roster_ok = checks
            .iter()
            .any(|check| check.name == ROSTER_CHECK && check.ok);
        let essential_ok = checks
            .iter()
            .filter(|check| check.name != GROUPS_CHECK)
            .all(|check| check.ok);
        let outcome = if !roster_ok || !essential_ok {
            TestOutcome::Failed
        } else if checks.iter().all(|check| check.ok) {
            TestOutcome::Success
        } else {
            TestOutcome::Partial
        };
        Self {
            provider,
            outcome,
            checks,
        }
    }
}

/// Outcome of a key rotation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: usize,
    pub current: usize,
    /// Bundles no configured key could open
    pub failed: Vec<Uuid>,
}

#[derive(Clone)]
pub struct SecretStore {
    db: DatabaseConnection,
    repository: SecretBundleRepository,
    vault: Arc<Vault>,
    factory: Arc<dyn AdapterFactory>,
    call_timeout: Duration,
}

impl SecretStore {
    pub fn new(
        db: DatabaseConnection,
        vault: Arc<Vault>,
        factory: Arc<dyn AdapterFactory>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            repository: SecretBundleRepository::new(db.clone()),
            db,
            vault,
            factory,
            call_timeout,
        }
    }

    /// Encrypt and store a new, inactive bundle
    pub async fn create(
        &self,
        provider: ProviderTag,
        plain: &PlainSecretBundle,
        actor: &str,
    ) -> Result<secret_bundle::Model, EngineError> {
        let cipher = self.vault.encrypt_bundle(provider, plain)?;

        let txn = self.db.begin().await?;
        let bundle = SecretBundleRepository::insert(&txn, provider, cipher).await?;
        AuditRecorder::record(
            &txn,
            actor,
            audit::SECRET_CREATED,
            &resource_ref(RESOURCE, bundle.id),
            json!({ "provider": provider, "key_id": self.vault.active_key_id() }),
        )
        .await?;
        txn.commit().await?;

        tracing::info!(bundle_id = %bundle.id, provider = %provider, "Secret bundle created");
        Ok(bundle)
    }

    /// Decrypted view of the provider's active bundle
    pub async fn get_active(&self, provider: ProviderTag) -> Result<PlainSecretBundle, EngineError> {
        let bundle = self
            .repository
            .find_active(provider)
            .await?
            .ok_or(EngineError::NotConfigured { provider })?;

        self.vault
            .decrypt_bundle(provider, &CipherBundle::from(&bundle))
            .map_err(|err| {
                tracing::error!(
                    bundle_id = %bundle.id,
                    provider = %provider,
                    error = %err,
                    "Active secret bundle failed to decrypt"
                );
                EngineError::from(err)
            })
    }

    pub async fn has_active(&self, provider: ProviderTag) -> Result<bool, EngineError> {
        Ok(self.repository.find_active(provider).await?.is_some())
    }

    /// Re-encrypt `plain` over an existing bundle, keeping its active flag.
    ///
    /// A bundle never changes provider; `expected` must match when given.
    pub async fn update(
        &self,
        id: Uuid,
        expected: Option<ProviderTag>,
        plain: &PlainSecretBundle,
        actor: &str,
    ) -> Result<secret_bundle::Model, EngineError> {
        let txn = self.db.begin().await?;
        let existing = SecretBundleRepository::find_by_id(&txn, id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, id))?;
        let provider = existing.provider;
        if let Some(expected) = expected
            && expected != provider
        {
            return Err(EngineError::Validation(format!(
                "bundle {} belongs to {}, not {}",
                id, provider, expected
            )));
        }
        let cipher = self.vault.encrypt_bundle(provider, plain)?;

        let bundle = SecretBundleRepository::replace_ciphertext(&txn, existing, cipher).await?;
        AuditRecorder::record(
            &txn,
            actor,
            audit::SECRET_UPDATED,
            &resource_ref(RESOURCE, id),
            json!({ "provider": provider, "key_id": self.vault.active_key_id() }),
        )
        .await?;
        txn.commit().await?;

        tracing::info!(bundle_id = %id, provider = %provider, "Secret bundle updated");
        Ok(bundle)
    }

    pub async fn delete(&self, id: Uuid, actor: &str) -> Result<(), EngineError> {
        let txn = self.db.begin().await?;
        let existing = SecretBundleRepository::find_by_id(&txn, id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, id))?;

        SecretBundleRepository::delete(&txn, id).await?;
        AuditRecorder::record(
            &txn,
            actor,
            audit::SECRET_DELETED,
            &resource_ref(RESOURCE, id),
            json!({ "provider": existing.provider, "was_active": existing.is_active }),
        )
        .await?;
        txn.commit().await?;

        if existing.is_active {
            tracing::warn!(
                bundle_id = %id,
                provider = %existing.provider,
                "Active secret bundle deleted; provider is now unconfigured"
            );
        }
        Ok(())
    }

    /// Make `id` the only active bundle for its provider.
    ///
    /// Deactivation of the previous bundle and activation of this one commit
    /// together. Concurrent activations are not queued: the partial unique
    /// index fails the losing transaction with a conflict error (409), so two
    /// active bundles never commit.
    pub async fn activate(&self, id: Uuid, actor: &str) -> Result<secret_bundle::Model, EngineError> {
        let txn = self.db.begin().await?;
        let existing = SecretBundleRepository::find_by_id(&txn, id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, id))?;
        let provider = existing.provider;

        // Refuse to activate something adapters could not decrypt.
        self.vault
            .decrypt_bundle(provider, &CipherBundle::from(&existing))?;

        if SecretBundleRepository::activate(&txn, provider, id).await? == 0 {
            return Err(EngineError::not_found(RESOURCE, id));
        }
        AuditRecorder::record(
            &txn,
            actor,
            audit::SECRET_ACTIVATED,
            &resource_ref(RESOURCE, id),
            json!({ "provider": provider }),
        )
        .await?;
        let activated = SecretBundleRepository::find_by_id(&txn, id)
            .await?
            .ok_or_else(|| EngineError::not_found(RESOURCE, id))?;
        txn.commit().await?;

        tracing::info!(bundle_id = %id, provider = %provider, "Secret bundle activated");
        Ok(activated)
    }

    /// Re-encrypt every bundle still carrying a retired key id under the
    /// active key. Bundles that fail to decrypt are left untouched and counted.
    pub async fn rotate(&self, actor: &str) -> Result<RotationReport, EngineError> {
        let mut report = RotationReport::default();

        for bundle in self.repository.list_all().await? {
            let cipher = CipherBundle::from(&bundle);
            if self.vault.is_current(&cipher).unwrap_or(false) {
                report.current += 1;
                continue;
            }

            let (id, provider) = (bundle.id, bundle.provider);
            let rotated = match self.vault.decrypt_bundle(provider, &cipher) {
                Ok(plain) => self.vault.encrypt_bundle(provider, &plain)?,
                Err(err) => {
                    tracing::error!(bundle_id = %id, provider = %provider, error = %err, "Cannot rotate secret bundle");
                    report.failed.push(id);
                    continue;
                }
            };

            let txn = self.db.begin().await?;
            SecretBundleRepository::replace_ciphertext(&txn, bundle, rotated).await?;
            AuditRecorder::record(
                &txn,
                actor,
                audit::SECRET_ROTATED,
                &resource_ref(RESOURCE, id),
                json!({ "provider": provider, "key_id": self.vault.active_key_id() }),
            )
            .await?;
            txn.commit().await?;

            tracing::info!(bundle_id = %id, provider = %provider, "Secret bundle rotated");
            report.rotated += 1;
        }

        Ok(report)
    }

    /// Exercise the adapter's roster and group calls with a candidate bundle.
    ///
    /// Nothing is persisted, whatever the outcome.
    pub async fn test(
        &self,
        provider: ProviderTag,
        plain: &PlainSecretBundle,
    ) -> Result<TestReport, EngineError> {
        plain.validate()?;

        let adapter = match self.factory.build(provider, plain) {
            Ok(adapter) => adapter,
            Err(AdapterError::NotConfigured { details, .. }) => {
                return Ok(TestReport::from_checks(
                    provider,
                    vec![TestCheck {
                        name: CONFIGURATION_CHECK.to_string(),
                        ok: false,
                        message: Some(details),
                    }],
                ));
            }
            Err(err) => return Err(err.into()),
        };

        let identities = tokio::time::timeout(self.call_timeout, adapter.list_identities()).await;
        let groups = tokio::time::timeout(self.call_timeout, adapter.list_groups()).await;

        let checks = vec![
            check(ROSTER_CHECK, identities),
            check(GROUPS_CHECK, groups),
        ];
        let report = TestReport::from_checks(provider, checks);

        tracing::info!(
            provider = %provider,
            outcome = ?report.outcome,
            "Credential test finished"
        );
        Ok(report)
    }
}

fn check<T>(name: &str, result: Result<Result<T, AdapterError>, Elapsed>) -> TestCheck {
    match result {
        Ok(Ok(_)) => TestCheck {
            name: name.to_string(),
            ok: true,
            message: None,
        },
        Ok(Err(err)) => TestCheck {
            name: name.to_string(),
            ok: false,
            message: Some(err.to_string()),
        },
        Err(_) => TestCheck {
            name: name.to_string(),
            ok: false,
            message: Some("timed out".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, ok: bool) -> TestCheck {
        TestCheck {
            name: name.to_string(),
            ok,
            message: None,
        }
    }

    #[test]
    fn test_report_outcome_is_three_way() {
        let success = TestReport::from_checks(
            ProviderTag::Slack,
            vec![named(ROSTER_CHECK, true), named(GROUPS_CHECK, true)],
        );
        assert_eq!(success.outcome, TestOutcome::Success);

        let partial = TestReport::from_checks(
            ProviderTag::Slack,
            vec![named(ROSTER_CHECK, true), named(GROUPS_CHECK, false)],
        );
        assert_eq!(partial.outcome, TestOutcome::Partial);

        let failed = TestReport::from_checks(
            ProviderTag::Slack,
            vec![named(CONFIGURATION_CHECK, false)],
        );
        assert_eq!(failed.outcome, TestOutcome::Failed);
    }

    #[test]
    fn test_report_roster_failure_is_never_partial() {
        let report = TestReport::from_checks(
            ProviderTag::Slack,
            vec![named(ROSTER_CHECK, false), named(GROUPS_CHECK, true)],
        );
        assert_eq!(report.outcome, TestOutcome::Failed);
    }

    #[test]
    fn test_outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TestOutcome::Partial).unwrap(),
            serde_json::json!("partial")
        );
    }
}
