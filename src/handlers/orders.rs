use crate::{
    auth::{AdminUser, AuthUser, MaybeAuthUser},
    errors::{ErrorResponse, ServiceError},
    handlers::common::{audit, CartSession, ClientInfo, ListQuery},
    services::{
        audit::AuditEntry,
        orders::{
            CancelOrderRequest, CancelRequester, CheckoutRequest, CustomerSummary,
            GuestLookupQuery, OrderFilter, OrderView, UpdateOrderStatusRequest,
            UpdatePaymentStatusRequest,
        },
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// Places an order for a signed-in customer or a guest.
#[utoipa::path(post, path = "/api/checkout", tag = "orders",
    params(("x-session-id" = Option<String>, Header, description = "Guest session, for cart checkout")),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderView),
        (status = 400, description = "Invalid request or coupon", body = ErrorResponse),
        (status = 422, description = "Not enough stock", body = ErrorResponse)
    ))]
pub async fn checkout(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    session: CartSession,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ServiceError> {
    let order = state
        .services
        .orders
        .place_order(user.map(|u| u.user_id), session.0.as_deref(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[utoipa::path(get, path = "/api/orders", tag = "orders",
    params(ListQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Own orders, newest first")))]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderView>> {
    let (page, limit) = query.normalized();
    let (items, total) = state
        .services
        .orders
        .list_for_customer(user.user_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(query.paginate(items, total))))
}

#[utoipa::path(get, path = "/api/orders/{id}", tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Order with items", body = OrderView),
        (status = 404, description = "Not found or not yours", body = ErrorResponse)
    ))]
pub async fn get_my_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    Ok(Json(ApiResponse::success(
        state.services.orders.get_for_user(user.user_id, id).await?,
    )))
}

#[utoipa::path(post, path = "/api/orders/{id}/cancel", tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cancelled", body = OrderView),
        (status = 400, description = "Order can no longer be cancelled", body = ErrorResponse)
    ))]
pub async fn cancel_my_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    request: Option<Json<CancelOrderRequest>>,
) -> ApiResult<OrderView> {
    let reason = request.and_then(|Json(r)| r.reason);
    Ok(Json(ApiResponse::success(
        state
            .services
            .orders
            .cancel(id, reason, CancelRequester::Customer(user.user_id))
            .await?,
    )))
}

/// Guest order tracking by confirmation number and contact details.
#[utoipa::path(get, path = "/api/orders/lookup", tag = "orders",
    params(GuestLookupQuery),
    responses(
        (status = 200, description = "Order", body = OrderView),
        (status = 404, description = "No matching order", body = ErrorResponse)
    ))]
pub async fn lookup_order(
    State(state): State<AppState>,
    Query(query): Query<GuestLookupQuery>,
) -> ApiResult<OrderView> {
    Ok(Json(ApiResponse::success(
        state
            .services
            .orders
            .lookup_guest_order(&query.confirmation_number, &query.email, &query.phone)
            .await?,
    )))
}

#[utoipa::path(get, path = "/api/admin/orders", tag = "admin",
    params(OrderFilter, ListQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Orders matching the filter")))]
pub async fn admin_list_orders(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<OrderFilter>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderView>> {
    let (page, limit) = query.normalized();
    let (items, total) = state.services.orders.list(&filter, page, limit).await?;
    Ok(Json(ApiResponse::success(query.paginate(items, total))))
}

#[utoipa::path(get, path = "/api/admin/orders/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Order id")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Order with items", body = OrderView)))]
pub async fn admin_get_order(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    Ok(Json(ApiResponse::success(
        state.services.orders.get_with_items(id).await?,
    )))
}

#[utoipa::path(put, path = "/api/admin/orders/{id}/status", tag = "admin",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated", body = OrderView),
        (status = 400, description = "Transition not allowed", body = ErrorResponse),
        (status = 409, description = "Concurrent modification", body = ErrorResponse)
    ))]
pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderView> {
    let details = serde_json::json!({
        "status": request.status,
        "trackingNumber": request.tracking_number,
    });
    let result = state.services.orders.update_status(id, request).await;
    let entry = AuditEntry::new(admin.user_id, "order.update_status", "order")
        .resource(id)
        .details(details);
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}

#[utoipa::path(put, path = "/api/admin/orders/{id}/payment-status", tag = "admin",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdatePaymentStatusRequest,
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Updated", body = OrderView)))]
pub async fn update_payment_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> ApiResult<OrderView> {
    let result = state
        .services
        .orders
        .update_payment_status(id, request.payment_status)
        .await;
    let entry = AuditEntry::new(admin.user_id, "order.update_payment_status", "order")
        .resource(id)
        .details(serde_json::json!({ "paymentStatus": request.payment_status }));
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}

#[utoipa::path(post, path = "/api/admin/orders/{id}/cancel", tag = "admin",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Cancelled", body = OrderView)))]
pub async fn admin_cancel_order(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    request: Option<Json<CancelOrderRequest>>,
) -> ApiResult<OrderView> {
    let reason = request.and_then(|Json(r)| r.reason);
    let result = state
        .services
        .orders
        .cancel(id, reason.clone(), CancelRequester::Admin(admin.user_id))
        .await;
    let entry = AuditEntry::new(admin.user_id, "order.cancel", "order")
        .resource(id)
        .details(serde_json::json!({ "reason": reason }));
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}

#[utoipa::path(get, path = "/api/admin/customers", tag = "admin",
    params(ListQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Customers by lifetime spend", body = [CustomerSummary])))]
pub async fn list_customers(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<CustomerSummary>> {
    let (page, limit) = query.normalized();
    Ok(Json(ApiResponse::success(
        state.services.orders.customer_summaries(page, limit).await?,
    )))
}
