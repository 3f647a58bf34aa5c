use crate::{
    auth::{AuthUser, MaybeAuthUser},
    errors::{ErrorResponse, ServiceError},
    handlers::common::{cart_owner, CartSession, SESSION_HEADER},
    services::carts::{AddCartItemRequest, CartView, UpdateCartItemRequest},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

/// Current cart of the caller. Signed-in users are identified by token,
/// guests by the `x-session-id` header.
#[utoipa::path(get, path = "/api/cart", tag = "cart",
    params(("x-session-id" = Option<String>, Header, description = "Guest session")),
    responses(
        (status = 200, description = "Cart", body = CartView),
        (status = 400, description = "Guest without session header", body = ErrorResponse)
    ))]
pub async fn get_cart(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    session: CartSession,
) -> ApiResult<CartView> {
    let owner = cart_owner(user.as_ref(), &session)?;
    Ok(Json(ApiResponse::success(
        state.services.carts.get_cart(&owner).await?,
    )))
}

#[utoipa::path(post, path = "/api/cart/items", tag = "cart",
    params(("x-session-id" = Option<String>, Header, description = "Guest session")),
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 422, description = "Not enough stock", body = ErrorResponse)
    ))]
pub async fn add_item(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    session: CartSession,
    Json(request): Json<AddCartItemRequest>,
) -> ApiResult<CartView> {
    let owner = cart_owner(user.as_ref(), &session)?;
    Ok(Json(ApiResponse::success(
        state.services.carts.add_item(&owner, request).await?,
    )))
}

#[utoipa::path(put, path = "/api/cart/items/{item_id}", tag = "cart",
    params(
        ("item_id" = Uuid, Path, description = "Cart line id"),
        ("x-session-id" = Option<String>, Header, description = "Guest session")
    ),
    request_body = UpdateCartItemRequest,
    responses((status = 200, description = "Updated cart", body = CartView)))]
pub async fn update_item(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    session: CartSession,
    Path(item_id): Path<Uuid>,
    Json(request): Json<UpdateCartItemRequest>,
) -> ApiResult<CartView> {
    let owner = cart_owner(user.as_ref(), &session)?;
    Ok(Json(ApiResponse::success(
        state
            .services
            .carts
            .update_item(&owner, item_id, request.quantity)
            .await?,
    )))
}

#[utoipa::path(delete, path = "/api/cart/items/{item_id}", tag = "cart",
    params(
        ("item_id" = Uuid, Path, description = "Cart line id"),
        ("x-session-id" = Option<String>, Header, description = "Guest session")
    ),
    responses((status = 200, description = "Updated cart", body = CartView)))]
pub async fn remove_item(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    session: CartSession,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartView> {
    let owner = cart_owner(user.as_ref(), &session)?;
    Ok(Json(ApiResponse::success(
        state.services.carts.remove_item(&owner, item_id).await?,
    )))
}

#[utoipa::path(delete, path = "/api/cart", tag = "cart",
    params(("x-session-id" = Option<String>, Header, description = "Guest session")),
    responses((status = 200, description = "Emptied cart", body = CartView)))]
pub async fn clear_cart(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    session: CartSession,
) -> ApiResult<CartView> {
    let owner = cart_owner(user.as_ref(), &session)?;
    Ok(Json(ApiResponse::success(
        state.services.carts.clear(&owner).await?,
    )))
}

/// Folds the guest cart named by `x-session-id` into the signed-in user's cart.
#[utoipa::path(post, path = "/api/cart/merge", tag = "cart",
    params(("x-session-id" = String, Header, description = "Guest session to merge")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Merged cart", body = CartView),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ))]
pub async fn merge_cart(
    State(state): State<AppState>,
    user: AuthUser,
    session: CartSession,
) -> ApiResult<CartView> {
    let session_id = session.0.ok_or_else(|| {
        ServiceError::ValidationError(format!("{} header is required", SESSION_HEADER))
    })?;
    Ok(Json(ApiResponse::success(
        state
            .services
            .carts
            .merge_guest_cart(&session_id, user.user_id)
            .await?,
    )))
}
