//! Bulk provisioner
//!
//! Runs the `(employee, provider)` cross product through one unit pipeline:
//!
//! 1. the employee must exist and not be terminated
//! 2. dedup pre-check against existing accounts
//! 3. identity mapping
//! 4. adapter call, bounded by the provider timeout
//! 5. conditional insert plus audit entry in one transaction
//!
//! Units run concurrently on a bounded pool. A unit failure is captured in
//! the batch result and never aborts its siblings; only database, audit and
//! integrity failures abort the batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditRecorder, resource_ref};
use crate::connectors::{AdapterFactory, IdentitySpec, ProviderAdapter, ProviderError};
use crate::error::EngineError;
use crate::identity::IdentityMapper;
use crate::models::ProviderTag;
use crate::models::employee::Model as Employee;
use crate::models::provider_account::{self, AccountStatus};
use crate::models::workflow_request::{BatchSummary, FailedUnit};
use crate::repositories::{EmployeeRepository, NewProviderAccount, ProviderAccountRepository};
use crate::secrets::SecretStore;
use crate::telemetry;

const ACCOUNT_RESOURCE: &str = "provider_account";

/// One account created by a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitSuccess {
    pub employee_id: Uuid,
    pub provider: ProviderTag,
    /// External account id at the provider
    pub account_id: String,
    /// Row id of the stored provider account
    pub provider_account_id: Uuid,
}

/// Aggregated outcome of one `provision` call
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkResult {
    pub results: Vec<UnitSuccess>,
    pub errors: Vec<FailedUnit>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// Units in flight at once
    pub concurrency: usize,
    /// Upper bound on every adapter call
    pub call_timeout: Duration,
}

/// Adapter resolved once per provider per batch
#[derive(Clone)]
enum AdapterSlot {
    Ready(Arc<dyn ProviderAdapter>),
    Unavailable { code: &'static str, message: String },
}

#[derive(Clone)]
pub struct BulkProvisioner {
    db: DatabaseConnection,
    employees: EmployeeRepository,
    accounts: ProviderAccountRepository,
    secrets: SecretStore,
    factory: Arc<dyn AdapterFactory>,
    mapper: &'static IdentityMapper,
    settings: ProvisionerSettings,
}

impl BulkProvisioner {
    pub fn new(
        db: DatabaseConnection,
        secrets: SecretStore,
        factory: Arc<dyn AdapterFactory>,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            employees: EmployeeRepository::new(db.clone()),
            accounts: ProviderAccountRepository::new(db.clone()),
            db,
            secrets,
            factory,
            mapper: IdentityMapper::standard(),
            settings,
        }
    }

    /// Provision every `(employee, provider)` pair.
    ///
    /// Duplicate ids and tags are collapsed first, so `total_operations` is
    /// the size of the de-duplicated cross product.
    pub async fn provision(
        &self,
        employee_ids: &[Uuid],
        providers: &[ProviderTag],
        actor: &str,
    ) -> Result<BulkResult, EngineError> {
        let employee_ids = dedup(employee_ids);
        let providers = dedup(providers);
        if employee_ids.is_empty() {
            return Err(EngineError::Validation(
                "employeeIds must not be empty".to_string(),
            ));
        }
        if providers.is_empty() {
            return Err(EngineError::Validation(
                "providers must not be empty".to_string(),
            ));
        }

        let employees: HashMap<Uuid, Employee> = self
            .employees
            .find_by_ids(&employee_ids)
            .await?
            .into_iter()
            .map(|employee| (employee.id, employee))
            .collect();

        let mut slots = HashMap::new();
        for provider in &providers {
            slots.insert(*provider, self.resolve_adapter(*provider).await?);
        }

        tracing::info!(
            employees = employee_ids.len(),
            providers = providers.len(),
            concurrency = self.settings.concurrency,
            "Starting bulk provisioning"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let actor: Arc<str> = Arc::from(actor);
        let mut handles = Vec::new();
        for employee_id in &employee_ids {
            for provider in &providers {
                let provisioner = self.clone();
                let employee = employees.get(employee_id).cloned();
                let slot = slots.get(provider).cloned();
                let actor = actor.clone();
                let (employee_id, provider) = (*employee_id, *provider);
                let permit = semaphore.clone().acquire_owned().await.map_err(|_| {
                    EngineError::InvalidState("provisioning pool closed".to_string())
                })?;

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    provisioner
                        .run_unit(employee_id, employee, provider, slot, &actor)
                        .await
                });
                handles.push((employee_id, provider, handle));
            }
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut fatal = None;
        for (employee_id, provider, handle) in handles {
            match handle.await {
                Ok(Ok(success)) => {
                    telemetry::record_unit(provider, "success");
                    results.push(success);
                }
                Ok(Err(err)) if err.is_batch_fatal() => {
                    tracing::error!(
                        employee_id = %employee_id,
                        provider = %provider,
                        error = %err,
                        "Unit failed with a batch-fatal error"
                    );
                    fatal.get_or_insert(err);
                }
                Ok(Err(err)) => {
                    telemetry::record_unit(provider, err.code());
                    errors.push(FailedUnit {
                        employee_id,
                        provider,
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                }
                Err(join_error) => {
                    tracing::error!(
                        employee_id = %employee_id,
                        provider = %provider,
                        error = %join_error,
                        "Provisioning task panicked"
                    );
                    telemetry::record_unit(provider, "INTERNAL_ERROR");
                    errors.push(FailedUnit {
                        employee_id,
                        provider,
                        code: "INTERNAL_ERROR".to_string(),
                        message: "provisioning task aborted".to_string(),
                    });
                }
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }

        let total = (employee_ids.len() * providers.len()) as u32;
        let summary = BatchSummary::new(total, results.len() as u32, errors.len() as u32);
        tracing::info!(
            total_operations = summary.total_operations,
            success_count = summary.success_count,
            error_count = summary.error_count,
            "Bulk provisioning finished"
        );

        Ok(BulkResult {
            results,
            errors,
            summary,
        })
    }

    /// Create a single account through the same pipeline as a batch unit.
    ///
    /// Unlike a batch, every failure is returned to the caller.
    pub async fn provision_one(
        &self,
        employee_id: Uuid,
        provider: ProviderTag,
        actor: &str,
    ) -> Result<UnitSuccess, EngineError> {
        let employee = self.employees.find_by_id(employee_id).await?;
        let slot = self.resolve_adapter(provider).await?;

        let result = self
            .run_unit(employee_id, employee, provider, Some(slot), actor)
            .await;
        match &result {
            Ok(_) => telemetry::record_unit(provider, "success"),
            Err(err) => telemetry::record_unit(provider, err.code()),
        }
        result
    }

    /// Deactivate an account at its provider, then mark the row `deleted`.
    pub async fn deactivate_account(
        &self,
        id: Uuid,
        actor: &str,
    ) -> Result<provider_account::Model, EngineError> {
        let account = self
            .accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(ACCOUNT_RESOURCE, id))?;
        if account.status == AccountStatus::Deleted {
            return Err(EngineError::InvalidState(format!(
                "account {} is already deleted",
                id
            )));
        }

        let plain = self.secrets.get_active(account.provider).await?;
        let adapter = self.factory.build(account.provider, &plain)?;
        self.bounded(account.provider, adapter.deactivate_identity(&account.account_id))
            .await?;

        let txn = self.db.begin().await?;
        if ProviderAccountRepository::mark_deleted(&txn, id).await? == 0 {
            return Err(EngineError::InvalidState(format!(
                "account {} is already deleted",
                id
            )));
        }
        AuditRecorder::record(
            &txn,
            actor,
            audit::ACCOUNT_DEACTIVATED,
            &resource_ref(ACCOUNT_RESOURCE, id),
            json!({
                "employee_id": account.employee_id,
                "provider": account.provider,
                "account_id": account.account_id,
            }),
        )
        .await?;
        txn.commit().await?;

        tracing::info!(
            account_id = %id,
            provider = %account.provider,
            "Provider account deactivated"
        );

        self.accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(ACCOUNT_RESOURCE, id))
    }

    /// Decrypt the active bundle and build the adapter for one provider.
    ///
    /// Missing credentials become a per-unit failure; an undecryptable
    /// bundle is returned as an error.
    async fn resolve_adapter(&self, provider: ProviderTag) -> Result<AdapterSlot, EngineError> {
        let built = match self.secrets.get_active(provider).await {
            Ok(plain) => self.factory.build(provider, &plain).map_err(EngineError::from),
            Err(err) => Err(err),
        };

        match built {
            Ok(adapter) => Ok(AdapterSlot::Ready(adapter)),
            Err(err) if err.is_batch_fatal() => Err(err),
            Err(err) => {
                tracing::warn!(provider = %provider, error = %err, "Provider unavailable for batch");
                Ok(AdapterSlot::Unavailable {
                    code: err.code(),
                    message: err.to_string(),
                })
            }
        }
    }

    async fn run_unit(
        &self,
        employee_id: Uuid,
        employee: Option<Employee>,
        provider: ProviderTag,
        slot: Option<AdapterSlot>,
        actor: &str,
    ) -> Result<UnitSuccess, EngineError> {
        let employee = employee.ok_or_else(|| EngineError::not_found("employee", employee_id))?;
        if employee.is_terminated() {
            return Err(EngineError::Validation(format!(
                "employee {} is terminated",
                employee_id
            )));
        }

        if self.accounts.exists(employee_id, provider).await? {
            return Err(already_exists(employee_id, provider));
        }

        let adapter = match slot {
            Some(AdapterSlot::Ready(adapter)) => adapter,
            Some(AdapterSlot::Unavailable { code, message }) => {
                return Err(match code {
                    "NOT_CONFIGURED" => EngineError::NotConfigured { provider },
                    _ => EngineError::Provider(ProviderError::new("unavailable", message)),
                });
            }
            None => return Err(EngineError::NotConfigured { provider }),
        };

        let mapped = self.mapper.map(&employee, provider)?;
        let spec = IdentitySpec {
            employee_id,
            email: employee.email.clone(),
            first_name: employee.first_name.clone(),
            last_name: employee.last_name.clone(),
            account_id: mapped.account_id.clone(),
            metadata: mapped.metadata.clone(),
        };

        let created = self.bounded(provider, adapter.create_identity(&spec)).await?;
        let (account_id, metadata) = self.mapper.reconcile(mapped, &created)?;

        let txn = self.db.begin().await?;
        let Some(account) = ProviderAccountRepository::insert_if_absent(
            &txn,
            NewProviderAccount {
                employee_id,
                provider,
                account_id: account_id.clone(),
                metadata,
            },
        )
        .await?
        else {
            tracing::warn!(
                employee_id = %employee_id,
                provider = %provider,
                account_id = %account_id,
                "Concurrent provisioning won the insert; identity created at provider is orphaned"
            );
            return Err(already_exists(employee_id, provider));
        };

        AuditRecorder::record(
            &txn,
            actor,
            audit::ACCOUNT_CREATED,
            &resource_ref(ACCOUNT_RESOURCE, account.id),
            json!({
                "employee_id": employee_id,
                "provider": provider,
                "account_id": account_id,
            }),
        )
        .await?;
        txn.commit().await?;

        tracing::debug!(
            employee_id = %employee_id,
            provider = %provider,
            account_id = %account_id,
            "Provider account created"
        );

        Ok(UnitSuccess {
            employee_id,
            provider,
            account_id,
            provider_account_id: account.id,
        })
    }

    /// Await an adapter call, turning an elapsed timeout into a provider error
    async fn bounded<T, F>(&self, provider: ProviderTag, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, crate::connectors::AdapterError>>,
    {
        let timeout = self.settings.call_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Provider(ProviderError::timeout(
                provider,
                timeout.as_millis() as u64,
            ))),
        }
    }
}

fn already_exists(employee_id: Uuid, provider: ProviderTag) -> EngineError {
    EngineError::AlreadyExists(format!(
        "employee {} already has a {} account",
        employee_id, provider
    ))
}

/// Order-preserving de-duplication
pub fn dedup<T: Copy + Eq + std::hash::Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items.iter().copied().filter(|item| seen.insert(*item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let providers = [
            ProviderTag::Slack,
            ProviderTag::Google,
            ProviderTag::Slack,
            ProviderTag::Github,
        ];
        assert_eq!(
            dedup(&providers),
            vec![ProviderTag::Slack, ProviderTag::Google, ProviderTag::Github]
        );
    }

    #[test]
    fn test_already_exists_names_the_pair() {
        let err = already_exists(Uuid::nil(), ProviderTag::Github);
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert!(err.to_string().contains("github"));
    }
}
