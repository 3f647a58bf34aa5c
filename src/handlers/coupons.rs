use crate::{
    auth::{AdminUser, MaybeAuthUser},
    errors::{ErrorResponse, ServiceError},
    handlers::common::{audit, ClientInfo, ListQuery},
    services::{
        audit::AuditEntry,
        coupons::{CouponContext, CouponView, CreateCouponRequest, UpdateCouponRequest},
        pricing::{paise_to_rupees, rupees_to_paise},
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    pub code: String,
    /// Cart subtotal in rupees
    pub subtotal: Decimal,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Checks a code against a cart. A rejected coupon is a normal response with
/// `valid: false` and the reason.
#[utoipa::path(post, path = "/api/coupons/validate", tag = "coupons",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Validation outcome", body = ValidateCouponResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse)
    ))]
pub async fn validate_coupon(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(request): Json<ValidateCouponRequest>,
) -> ApiResult<ValidateCouponResponse> {
    let subtotal_paise = rupees_to_paise(request.subtotal)
        .filter(|p| *p >= 0)
        .ok_or_else(|| ServiceError::ValidationError("Invalid subtotal".into()))?;
    let validation = state
        .services
        .coupons
        .validate(CouponContext {
            code: &request.code,
            user_id: user.as_ref().map(|u| u.user_id),
            subtotal_paise,
            product_ids: &request.product_ids,
        })
        .await?;

    Ok(Json(ApiResponse::success(ValidateCouponResponse {
        valid: validation.is_valid,
        discount: paise_to_rupees(validation.discount_paise),
        message: validation.error(),
        code: validation
            .coupon
            .filter(|_| validation.is_valid)
            .map(|c| c.code),
    })))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CouponQuery {
    #[serde(default)]
    pub active_only: bool,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(get, path = "/api/admin/coupons", tag = "admin",
    params(CouponQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Coupons")))]
pub async fn list_coupons(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<CouponQuery>,
) -> ApiResult<PaginatedResponse<CouponView>> {
    let defaults = ListQuery::default();
    let paging = ListQuery {
        page: query.page.unwrap_or(defaults.page),
        limit: query.limit.unwrap_or(defaults.limit),
    };
    let (page, limit) = paging.normalized();
    let (items, total) = state
        .services
        .coupons
        .list(page, limit, query.active_only)
        .await?;
    Ok(Json(ApiResponse::success(paging.paginate(items, total))))
}

#[utoipa::path(post, path = "/api/admin/coupons", tag = "admin",
    request_body = CreateCouponRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Created", body = CouponView),
        (status = 409, description = "Code already exists", body = ErrorResponse)
    ))]
pub async fn create_coupon(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CouponView>>), ServiceError> {
    let result = state.services.coupons.create(request).await;
    let mut entry = AuditEntry::new(admin.user_id, "coupon.create", "coupon");
    if let Ok(coupon) = &result {
        entry = entry
            .resource(coupon.id)
            .details(serde_json::json!({ "code": coupon.code }));
    }
    audit(&state, &admin, &client, entry, &result).await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(result?))))
}

#[utoipa::path(get, path = "/api/admin/coupons/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Coupon id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Coupon", body = CouponView),
        (status = 404, description = "Not found", body = ErrorResponse)
    ))]
pub async fn get_coupon(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<CouponView> {
    Ok(Json(ApiResponse::success(state.services.coupons.get(id).await?)))
}

#[utoipa::path(put, path = "/api/admin/coupons/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Coupon id")),
    request_body = UpdateCouponRequest,
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Updated", body = CouponView)))]
pub async fn update_coupon(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> ApiResult<CouponView> {
    let result = state.services.coupons.update(id, request).await;
    let entry = AuditEntry::new(admin.user_id, "coupon.update", "coupon").resource(id);
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}

#[utoipa::path(post, path = "/api/admin/coupons/{id}/deactivate", tag = "admin",
    params(("id" = Uuid, Path, description = "Coupon id")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Deactivated", body = CouponView)))]
pub async fn deactivate_coupon(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
) -> ApiResult<CouponView> {
    let result = state.services.coupons.deactivate(id).await;
    let entry = AuditEntry::new(admin.user_id, "coupon.deactivate", "coupon").resource(id);
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}

#[utoipa::path(delete, path = "/api/admin/coupons/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Coupon id")),
    security(("bearer_auth" = [])),
    responses((status = 204, description = "Deleted")))]
pub async fn delete_coupon(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    let result = state.services.coupons.delete(id).await;
    let entry = AuditEntry::new(admin.user_id, "coupon.delete", "coupon").resource(id);
    audit(&state, &admin, &client, entry, &result).await;
    result.map(|()| StatusCode::NO_CONTENT)
}
