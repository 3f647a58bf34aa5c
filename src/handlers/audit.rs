use crate::{
    auth::AdminUser,
    errors::{ErrorResponse, ServiceError},
    handlers::common::{ClientInfo, ListQuery},
    services::audit::{
        AdminSessionView, AuditLogFilter, AuditLogView, SecurityEventFilter, SecurityEventView,
        SuspiciousPattern,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

#[utoipa::path(get, path = "/api/admin/audit-logs", tag = "admin",
    params(AuditLogFilter, ListQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Audit trail, newest first")))]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<AuditLogFilter>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<AuditLogView>> {
    let (page, limit) = query.normalized();
    let (items, total) = state.services.audit.list(&filter, page, limit).await?;
    Ok(Json(ApiResponse::success(query.paginate(items, total))))
}

#[utoipa::path(get, path = "/api/admin/security-events", tag = "admin",
    params(SecurityEventFilter, ListQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Security events, newest first")))]
pub async fn list_security_events(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<SecurityEventFilter>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<SecurityEventView>> {
    let (page, limit) = query.normalized();
    let (items, total) = state
        .services
        .audit
        .list_security_events(&filter, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(query.paginate(items, total))))
}

#[utoipa::path(post, path = "/api/admin/security-events/{id}/resolve", tag = "admin",
    params(("id" = Uuid, Path, description = "Security event id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Resolved", body = SecurityEventView),
        (status = 404, description = "Not found", body = ErrorResponse)
    ))]
pub async fn resolve_security_event(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<SecurityEventView> {
    Ok(Json(ApiResponse::success(
        state.services.audit.resolve_security_event(id).await?,
    )))
}

/// Runs the suspicious-activity detectors over one admin's recent trail.
#[utoipa::path(post, path = "/api/admin/security/scan/{admin_id}", tag = "admin",
    params(("admin_id" = Uuid, Path, description = "Admin to scan")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Patterns found", body = [SuspiciousPattern])))]
pub async fn scan_admin(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(admin_id): Path<Uuid>,
) -> ApiResult<Vec<SuspiciousPattern>> {
    Ok(Json(ApiResponse::success(
        state
            .services
            .audit
            .detect_suspicious_activity(admin_id)
            .await?,
    )))
}

#[utoipa::path(post, path = "/api/admin/sessions", tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 201, description = "Session started", body = AdminSessionView)))]
pub async fn start_session(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
) -> Result<(StatusCode, Json<ApiResponse<AdminSessionView>>), ServiceError> {
    let session = state
        .services
        .audit
        .start_session(admin.user_id, client.ip_address, client.user_agent)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

#[utoipa::path(delete, path = "/api/admin/sessions/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Session id")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Session ended", body = AdminSessionView)))]
pub async fn end_session(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<AdminSessionView> {
    Ok(Json(ApiResponse::success(
        state.services.audit.end_session(admin.user_id, id).await?,
    )))
}
