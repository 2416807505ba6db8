//! Test utilities shared by the integration suites.
//!
//! In-memory SQLite with migrations applied, a scripted adapter factory that
//! stands in for real providers, and small fixtures for employees and secret
//! bundles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use provisioning::config::AppConfig;
use provisioning::connectors::{
    AdapterError, AdapterFactory, ExternalAccountRef, Group, Identity, IdentitySpec,
    ProviderAdapter, ProviderError, ProviderSettings, Registry,
};
use provisioning::crypto::PlainSecretBundle;
use provisioning::models::{ProviderTag, employee};
use provisioning::repositories::{
    EmployeeRepository, NewEmployee, NewProviderAccount, ProviderAccountRepository,
};
use provisioning::secrets::SecretStore;
use provisioning::server::AppState;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

pub const OPERATOR_TOKEN: &str = "test-operator-token";
pub const MASTER_KEY: &str = "test-master-key";
pub const ACTOR: &str = "system";

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// The pool is capped at one connection: every connection to
/// `sqlite::memory:` is a separate database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    // Fixtures reference employees that some tests never insert.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Configuration with the secrets every service needs
pub fn test_config() -> AppConfig {
    AppConfig {
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        master_key: Some(MASTER_KEY.to_string()),
        provider_timeout_ms: 300,
        bulk_concurrency: 4,
        ..AppConfig::default()
    }
}

/// How a scripted adapter answers every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    /// Fail every call with this provider error code
    Fail(&'static str),
    /// Roster works, group listing fails
    GroupsForbidden,
    /// Never answer within any sane timeout
    Hang,
    /// Another writer stores the account while the identity is created
    LoseInsertRace,
}

/// Adapter factory returning scripted adapters and counting their calls
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<ProviderTag, Script>>,
    created: Arc<AtomicUsize>,
    deactivated: Arc<Mutex<Vec<String>>>,
    competing_writer: Mutex<Option<DatabaseConnection>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, provider: ProviderTag, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(provider, script);
    }

    /// Connection `Script::LoseInsertRace` adapters write through
    pub fn competing_writer(&self, db: DatabaseConnection) {
        *self
            .competing_writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = Some(db);
    }

    /// Identities created at any provider so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn deactivated(&self) -> Vec<String> {
        self.deactivated
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl AdapterFactory for ScriptedFactory {
    fn build(
        &self,
        provider: ProviderTag,
        secrets: &PlainSecretBundle,
    ) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
        if secrets.client_secret == "unusable" {
            return Err(AdapterError::not_configured(
                provider,
                "client secret rejected by scripted factory",
            ));
        }
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&provider)
            .copied()
            .unwrap_or(Script::Succeed);

        let competing_writer = self
            .competing_writer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone();

        Ok(Arc::new(ScriptedAdapter {
            provider,
            script,
            created: self.created.clone(),
            deactivated: self.deactivated.clone(),
            competing_writer,
        }))
    }
}

struct ScriptedAdapter {
    provider: ProviderTag,
    script: Script,
    created: Arc<AtomicUsize>,
    deactivated: Arc<Mutex<Vec<String>>>,
    competing_writer: Option<DatabaseConnection>,
}

impl ScriptedAdapter {
    async fn gate(&self) -> Result<(), AdapterError> {
        match self.script {
            Script::Fail(code) => Err(ProviderError::new(code, "scripted failure").into()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            Script::Succeed | Script::GroupsForbidden | Script::LoseInsertRace => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> ProviderTag {
        self.provider
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, AdapterError> {
        self.gate().await?;
        Ok(vec![Identity {
            external_id: "existing".to_string(),
            email: Some("existing@example.com".to_string()),
            display_name: None,
            active: true,
        }])
    }

    async fn create_identity(
        &self,
        spec: &IdentitySpec,
    ) -> Result<ExternalAccountRef, AdapterError> {
        self.gate().await?;
        if self.script == Script::LoseInsertRace
            && let Some(db) = &self.competing_writer
        {
            ProviderAccountRepository::insert_if_absent(
                db,
                NewProviderAccount {
                    employee_id: spec.employee_id,
                    provider: self.provider,
                    account_id: spec.account_id.clone(),
                    metadata: spec.metadata.clone(),
                },
            )
            .await
            .map_err(|err| ProviderError::new("competing_writer", err.to_string()))?;
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(match self.provider {
            ProviderTag::Github => ExternalAccountRef {
                account_id: format!("gh-{}", n),
                login: Some(format!("login-{}", n)),
            },
            _ => ExternalAccountRef {
                account_id: spec.account_id.clone(),
                login: None,
            },
        })
    }

    async fn deactivate_identity(&self, external_id: &str) -> Result<(), AdapterError> {
        self.gate().await?;
        self.deactivated
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(external_id.to_string());
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AdapterError> {
        self.gate().await?;
        if self.script == Script::GroupsForbidden {
            return Err(ProviderError::new("forbidden", "missing_scope").into());
        }
        Ok(vec![Group {
            id: "g-1".to_string(),
            name: "engineering".to_string(),
        }])
    }
}

/// Application state wired to `factory` instead of the real adapters
pub fn test_state(db: DatabaseConnection, factory: Arc<ScriptedFactory>) -> Result<AppState> {
    let config = test_config();
    let registry = Arc::new(Registry::with_builtin_providers(
        ProviderSettings::from_config(&config),
    ));
    AppState::with_factory(config, db, registry, factory)
}

pub fn sample_secrets() -> PlainSecretBundle {
    PlainSecretBundle {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        signing_secret: "signing-secret".to_string(),
        bot_token: Some("xoxb-test".to_string()),
        user_token: None,
    }
}

/// Store and activate a bundle so `provider` counts as configured
pub async fn configure_provider(store: &SecretStore, provider: ProviderTag) -> Result<()> {
    let bundle = store.create(provider, &sample_secrets(), ACTOR).await?;
    store.activate(bundle.id, ACTOR).await?;
    Ok(())
}

pub async fn create_employee(db: &DatabaseConnection, email: &str) -> Result<employee::Model> {
    let (first, last) = email
        .split('@')
        .next()
        .and_then(|local| local.split_once('.'))
        .unwrap_or(("Test", "Employee"));
    let employee = EmployeeRepository::new(db.clone())
        .create(NewEmployee {
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            department: "Engineering".to_string(),
            position: "Software Engineer".to_string(),
            manager_id: None,
            hired_at: Utc::now().fixed_offset(),
        })
        .await?;
    Ok(employee)
}
