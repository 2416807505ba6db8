//! Telemetry utilities for request-scoped tracing metadata, global subscriber
//! management, and the engine's counters.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;
use crate::models::ProviderTag;
use crate::models::workflow_request::WorkflowStatus;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub const UNITS_TOTAL: &str = "provisioning_units_total";
pub const UNIT_FAILURES_TOTAL: &str = "provisioning_unit_failures_total";
pub const WORKFLOW_TRANSITIONS_TOTAL: &str = "workflow_transitions_total";

/// Trace context containing request correlation ID.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

impl TraceContext {
    /// Reuse a caller-supplied request id or mint a `corr-` id
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        let trace_id = value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(generate_trace_id);
        Self { trace_id }
    }
}

pub fn generate_trace_id() -> String {
    format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize global tracing/logging exactly once, wiring `log::` macros into the tracing pipeline.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    // sqlx and the db bootstrap log through `log::`
    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        let logger_type = type_name_of_val(log::logger());
        if !logger_type.contains("LogTracer") {
            eprintln!(
                "Warning: Failed to install log tracer bridge: {}. `log::` records will not reach tracing.",
                err
            );
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().with_current_span(true).boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: Failed to set global tracing subscriber: {}. Default subscriber remains in effect.",
            err
        );
    }

    Ok(())
}

/// Execute `future` within the provided trace context, making it available through task-local
/// storage for the duration of the request.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// Get the currently active trace ID, if one has been set for the running task.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}

/// Middleware scoping every request in a `TraceContext` and echoing its id
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::from_header(request.headers().get(REQUEST_ID_HEADER));
    let trace_id = context.trace_id.clone();
    request.extensions_mut().insert(context.clone());

    let mut response = with_trace_context(context, next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Count one provisioning unit outcome
pub fn record_unit(provider: ProviderTag, outcome: &'static str) {
    metrics::counter!(UNITS_TOTAL, "provider" => provider.as_str(), "outcome" => outcome)
        .increment(1);
    if outcome != "success" {
        metrics::counter!(UNIT_FAILURES_TOTAL, "provider" => provider.as_str(), "code" => outcome)
            .increment(1);
    }
}

pub fn record_transition(to: WorkflowStatus) {
    metrics::counter!(WORKFLOW_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}
