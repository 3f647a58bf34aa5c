use crate::{
    auth::AdminUser,
    errors::ErrorResponse,
    handlers::common::{audit, ClientInfo},
    services::{
        audit::AuditEntry,
        inventory::{InventoryView, UpdateStockRequest},
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

#[utoipa::path(get, path = "/api/admin/inventory/low-stock", tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Items at or below their reorder point", body = [InventoryView])))]
pub async fn low_stock(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Vec<InventoryView>> {
    let items = state.services.inventory.low_stock().await?;
    Ok(Json(ApiResponse::success(
        items.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(put, path = "/api/admin/inventory/{product_id}", tag = "admin",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = UpdateStockRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated stock", body = InventoryView),
        (status = 409, description = "Below reserved quantity", body = ErrorResponse)
    ))]
pub async fn update_stock(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(product_id): Path<Uuid>,
    Json(request): Json<UpdateStockRequest>,
) -> ApiResult<InventoryView> {
    let details = serde_json::json!({ "stockQuantity": request.stock_quantity });
    let result = state
        .services
        .inventory
        .update_stock(product_id, request)
        .await;
    let entry = AuditEntry::new(admin.user_id, "inventory.update_stock", "inventory")
        .resource(product_id)
        .details(details);
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?.into())))
}
