//! # Audit API Handlers

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{ActorHeader, OperatorAuth};
use crate::error::ApiError;
use crate::handlers::types::{AuditEntryView, PageInfo, PageQuery};
use crate::repositories::AuditListFilter;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAuditLogsQuery {
    /// Exact action, e.g. `account.created`
    pub action: Option<String>,
    /// Actor user id or `system`
    pub actor: Option<String>,
    /// Exact `kind:id` resource reference
    pub resource: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogsResponse {
    /// Newest first; empty when nothing has been recorded
    pub entries: Vec<AuditEntryView>,
    pub page: PageInfo,
}

/// List audit entries
#[utoipa::path(
    get,
    path = "/audit-logs",
    security(("bearer_auth" = [])),
    params(ActorHeader, ListAuditLogsQuery),
    responses(
        (status = 200, description = "Page of audit entries", body = AuditLogsResponse, example = json!({
            "entries": [],
            "page": { "total": 0, "limit": 50, "offset": 0, "hasMore": false }
        })),
        (status = 400, description = "Invalid page size", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "audit"
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<Json<AuditLogsResponse>, ApiError> {
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = (page.limit(), page.offset());

    let result = state
        .audit
        .list(AuditListFilter {
            action: query.action,
            actor: query.actor,
            resource: query.resource,
            limit,
            offset,
        })
        .await?;

    Ok(Json(AuditLogsResponse {
        entries: result.entries.into_iter().map(AuditEntryView::from).collect(),
        page: PageInfo::new(result.total, limit, offset),
    }))
}
