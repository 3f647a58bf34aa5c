use crate::{
    auth::AdminUser,
    errors::{ErrorResponse, ServiceError},
    handlers::common::{audit, ClientInfo, ListQuery},
    services::{
        audit::AuditEntry,
        products::{CreateProductRequest, ProductView, UpdateProductRequest},
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductQuery {
    fn paging(&self) -> ListQuery {
        let defaults = ListQuery::default();
        ListQuery {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

/// Public catalogue listing
#[utoipa::path(get, path = "/api/products", tag = "products",
    params(ProductQuery),
    responses((status = 200, description = "Active products with availability")))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<PaginatedResponse<ProductView>> {
    let paging = query.paging();
    let (page, limit) = paging.normalized();
    let (items, total) = state
        .services
        .products
        .list(query.category.as_deref(), false, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(paging.paginate(items, total))))
}

#[utoipa::path(get, path = "/api/products/{id}", tag = "products",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ProductView),
        (status = 404, description = "Unknown or inactive", body = ErrorResponse)
    ))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductView> {
    let product = state.services.products.get(id, false).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Admin listing, optionally including inactive products
#[utoipa::path(get, path = "/api/admin/products", tag = "admin",
    params(ProductQuery),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Products")))]
pub async fn admin_list_products(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ProductQuery>,
) -> ApiResult<PaginatedResponse<ProductView>> {
    let paging = query.paging();
    let (page, limit) = paging.normalized();
    let (items, total) = state
        .services
        .products
        .list(query.category.as_deref(), query.include_inactive, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(paging.paginate(items, total))))
}

#[utoipa::path(post, path = "/api/admin/products", tag = "admin",
    request_body = CreateProductRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Created", body = ProductView),
        (status = 409, description = "Duplicate SKU", body = ErrorResponse)
    ))]
pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductView>>), ServiceError> {
    let sku = request.sku.clone();
    let result = state.services.products.create(request).await;
    let entry = AuditEntry::new(admin.user_id, "product.create", "product")
        .details(serde_json::json!({ "sku": sku }));
    let entry = match &result {
        Ok(p) => entry.resource(p.id),
        Err(_) => entry,
    };
    audit(&state, &admin, &client, entry, &result).await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(result?))))
}

#[utoipa::path(put, path = "/api/admin/products/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Updated", body = ProductView)))]
pub async fn update_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<ProductView> {
    let result = state.services.products.update(id, request).await;
    let entry = AuditEntry::new(admin.user_id, "product.update", "product").resource(id);
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}

/// Soft delete: the product leaves the catalogue but stays on past orders.
#[utoipa::path(delete, path = "/api/admin/products/{id}", tag = "admin",
    params(("id" = Uuid, Path, description = "Product id")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deactivated", body = ProductView),
        (status = 404, description = "Not found", body = ErrorResponse)
    ))]
pub async fn deactivate_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductView> {
    let result = state.services.products.deactivate(id).await;
    let entry = AuditEntry::new(admin.user_id, "product.deactivate", "product").resource(id);
    audit(&state, &admin, &client, entry, &result).await;
    Ok(Json(ApiResponse::success(result?)))
}
