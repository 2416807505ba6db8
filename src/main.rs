//! # Provisioning Engine Entry Point

use anyhow::Context;
use provisioning::{
    config::ConfigLoader,
    db,
    server::{AppState, run_server},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Layered env files, then PROVISIONING_* variables; validated on load
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;

    telemetry::init_tracing(&config).context("initializing telemetry")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::migrate(&db).await?;

    let state = AppState::new(config, db).context("wiring application state")?;
    run_server(state).await
}
