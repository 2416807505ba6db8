use std::sync::Arc;

use anyhow::{Context, Result, bail};
use provisioning::{
    config::ConfigLoader,
    connectors::{AdapterFactory, ProviderSettings, Registry},
    db,
    models::audit_log::SYSTEM_ACTOR,
    secrets::SecretStore,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    let vault = Arc::new(config.vault().context("initializing secret vault")?);
    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    let factory: Arc<dyn AdapterFactory> = Arc::new(Registry::with_builtin_providers(
        ProviderSettings::from_config(&config),
    ));
    let store = SecretStore::new(db, vault, factory, config.provider_timeout());

    let report = store
        .rotate(SYSTEM_ACTOR)
        .await
        .context("rotating secret bundles")?;

    tracing::info!(
        rotated = report.rotated,
        current = report.current,
        failed = report.failed.len(),
        key_id = config.master_key_id,
        "Secret bundle rotation finished"
    );

    if !report.failed.is_empty() {
        bail!(
            "{} bundle(s) could not be decrypted with any configured key: {:?}",
            report.failed.len(),
            report.failed
        );
    }
    Ok(())
}
