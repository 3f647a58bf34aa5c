use crate::{
    auth::AuthUser,
    errors::{ErrorResponse, ServiceError},
    services::addresses::{AddressDetails, AddressView},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

#[utoipa::path(get, path = "/api/addresses", tag = "addresses",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Saved addresses, default first", body = [AddressView])))]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<AddressView>> {
    Ok(Json(ApiResponse::success(
        state.services.addresses.list(user.user_id).await?,
    )))
}

#[utoipa::path(post, path = "/api/addresses", tag = "addresses",
    request_body = AddressDetails,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Saved", body = AddressView),
        (status = 400, description = "Invalid address", body = ErrorResponse)
    ))]
pub async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(details): Json<AddressDetails>,
) -> Result<(StatusCode, Json<ApiResponse<AddressView>>), ServiceError> {
    let address = state.services.addresses.create(user.user_id, details).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(address))))
}

#[utoipa::path(put, path = "/api/addresses/{id}", tag = "addresses",
    params(("id" = Uuid, Path, description = "Address id")),
    request_body = AddressDetails,
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Updated", body = AddressView)))]
pub async fn update_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(details): Json<AddressDetails>,
) -> ApiResult<AddressView> {
    Ok(Json(ApiResponse::success(
        state
            .services
            .addresses
            .update(user.user_id, id, details)
            .await?,
    )))
}

#[utoipa::path(delete, path = "/api/addresses/{id}", tag = "addresses",
    params(("id" = Uuid, Path, description = "Address id")),
    security(("bearer_auth" = [])),
    responses((status = 204, description = "Deleted")))]
pub async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.addresses.delete(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/api/addresses/{id}/default", tag = "addresses",
    params(("id" = Uuid, Path, description = "Address id")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "New default", body = AddressView)))]
pub async fn set_default_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<AddressView> {
    Ok(Json(ApiResponse::success(
        state.services.addresses.set_default(user.user_id, id).await?,
    )))
}
