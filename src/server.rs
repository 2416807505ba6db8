//! # Server Configuration
//!
//! Router, shared state and OpenAPI document for the provisioning API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::audit::AuditRecorder;
use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::connectors::{AdapterFactory, ProviderSettings, Registry};
use crate::handlers;
use crate::provisioner::{BulkProvisioner, ProvisionerSettings};
use crate::secrets::SecretStore;
use crate::telemetry::trace_context_middleware;
use crate::workflow::WorkflowEngine;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub registry: Arc<Registry>,
    pub engine: WorkflowEngine,
    pub provisioner: BulkProvisioner,
    pub secrets: SecretStore,
    pub audit: AuditRecorder,
}

impl AppState {
    /// Wire every service from configuration, using the built-in registry as
    /// the adapter factory.
    pub fn new(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::with_builtin_providers(
            ProviderSettings::from_config(&config),
        ));
        let factory: Arc<dyn AdapterFactory> = registry.clone();
        Self::with_factory(config, db, registry, factory)
    }

    /// Like [`AppState::new`] but with a caller-supplied adapter factory
    pub fn with_factory(
        config: AppConfig,
        db: DatabaseConnection,
        registry: Arc<Registry>,
        factory: Arc<dyn AdapterFactory>,
    ) -> anyhow::Result<Self> {
        let vault = Arc::new(config.vault()?);
        let secrets = SecretStore::new(
            db.clone(),
            vault,
            factory.clone(),
            config.provider_timeout(),
        );
        let provisioner = BulkProvisioner::new(
            db.clone(),
            secrets.clone(),
            factory,
            ProvisionerSettings {
                concurrency: config.bulk_concurrency,
                call_timeout: config.provider_timeout(),
            },
        );

        Ok(Self {
            engine: WorkflowEngine::new(db.clone()),
            audit: AuditRecorder::new(db.clone()),
            provisioner,
            secrets,
            registry,
            config: Arc::new(config),
            db,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/providers", get(handlers::providers::list_providers))
        .route(
            "/provisioning/bulk",
            post(handlers::provisioning::bulk_provision),
        )
        .route(
            "/employees/{id}/accounts",
            post(handlers::provisioning::create_account),
        )
        .route(
            "/accounts/{id}",
            delete(handlers::accounts::deactivate_account),
        )
        .route(
            "/workflows",
            post(handlers::workflows::create_workflow).get(handlers::workflows::list_workflows),
        )
        .route("/workflows/{id}", get(handlers::workflows::get_workflow))
        .route(
            "/workflows/{id}/approvals",
            post(handlers::workflows::record_approval),
        )
        .route(
            "/workflows/{id}/advance",
            post(handlers::workflows::advance_workflow),
        )
        .route("/audit-logs", get(handlers::audit::list_audit_logs))
        .route("/secrets", post(handlers::secrets::create_secret))
        .route("/secrets/test", post(handlers::secrets::test_secret))
        .route(
            "/secrets/{key}",
            get(handlers::secrets::get_active_secret)
                .put(handlers::secrets::update_secret)
                .delete(handlers::secrets::delete_secret),
        )
        .route(
            "/secrets/{key}/activate",
            post(handlers::secrets::activate_secret),
        )
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server with the given configuration
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::providers::list_providers,
        crate::handlers::provisioning::bulk_provision,
        crate::handlers::provisioning::create_account,
        crate::handlers::accounts::deactivate_account,
        crate::handlers::workflows::create_workflow,
        crate::handlers::workflows::list_workflows,
        crate::handlers::workflows::get_workflow,
        crate::handlers::workflows::record_approval,
        crate::handlers::workflows::advance_workflow,
        crate::handlers::audit::list_audit_logs,
        crate::handlers::secrets::create_secret,
        crate::handlers::secrets::get_active_secret,
        crate::handlers::secrets::update_secret,
        crate::handlers::secrets::delete_secret,
        crate::handlers::secrets::activate_secret,
        crate::handlers::secrets::test_secret,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
            crate::connectors::ProviderMetadata,
            crate::connectors::ProviderError,
            crate::handlers::providers::ProviderInfo,
            crate::handlers::providers::ProvidersResponse,
            crate::handlers::provisioning::BulkProvisionRequest,
            crate::handlers::provisioning::BulkProvisionResponse,
            crate::handlers::provisioning::CreateAccountRequest,
            crate::handlers::types::AccountView,
            crate::handlers::types::WorkflowView,
            crate::handlers::types::ApprovalView,
            crate::handlers::types::AuditEntryView,
            crate::handlers::types::SecretBundleView,
            crate::handlers::types::PageInfo,
            crate::handlers::workflows::CreateWorkflowRequest,
            crate::handlers::workflows::WorkflowDetailResponse,
            crate::handlers::workflows::WorkflowsResponse,
            crate::handlers::workflows::ApprovalRequest,
            crate::handlers::workflows::AdvanceRequest,
            crate::handlers::audit::AuditLogsResponse,
            crate::handlers::secrets::SecretRequest,
            crate::handlers::secrets::ActiveSecretResponse,
            crate::provisioner::UnitSuccess,
            crate::secrets::TestReport,
            crate::secrets::TestCheck,
            crate::secrets::TestOutcome,
            crate::workflow::Decision,
            crate::models::workflow_request::BatchSummary,
            crate::models::workflow_request::FailedUnit,
            crate::models::workflow_request::ExecutionReport,
            crate::models::workflow_request::WorkflowPayload,
            crate::models::workflow_request::WorkflowStatus,
            crate::models::workflow_request::WorkflowType,
            crate::models::approval::ApprovalStatus,
            crate::models::provider_account::AccountStatus,
            crate::models::provider_account::AccountMetadata,
            crate::models::ProviderTag,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "providers", description = "Provider catalogue"),
        (name = "provisioning", description = "Account provisioning"),
        (name = "workflows", description = "Approval workflows"),
        (name = "audit", description = "Audit trail"),
        (name = "secrets", description = "Provider credential bundles"),
    ),
    info(
        title = "Provisioning Engine API",
        description = "Account provisioning and approval workflows for SaaS providers",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
