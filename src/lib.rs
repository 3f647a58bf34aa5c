//! Storefront API Library
//!
//! Checkout, order lifecycle, coupons, inventory reservations and
//! transactional notifications for a jewelry storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::FromRef,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};
use utoipa::ToSchema;

use crate::{
    auth::AuthService, config::AppConfig, events::EventSender, handlers::AppServices,
    notifications::NotificationDispatcher,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub notifier: Arc<NotificationDispatcher>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

impl AppState {
    /// Builds state and services over an established connection.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: Arc<EventSender>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        let auth = Arc::new(AuthService::from_config(&config));
        let services = AppServices::new(db.clone(), &config, event_sender.clone(), notifier.clone());
        Self {
            db,
            config: Arc::new(config),
            auth,
            notifier,
            event_sender,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrappers
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Customer-facing routes. Guests and signed-in users share most of them.
pub fn public_routes() -> Router<AppState> {
    use handlers::{addresses, carts, coupons, orders, products};

    Router::new()
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .route("/coupons/validate", post(coupons::validate_coupon))
        .route("/cart", get(carts::get_cart).delete(carts::clear_cart))
        .route("/cart/items", post(carts::add_item))
        .route(
            "/cart/items/:item_id",
            put(carts::update_item).delete(carts::remove_item),
        )
        .route("/cart/merge", post(carts::merge_cart))
        .route("/checkout", post(orders::checkout))
        .route("/orders", get(orders::list_my_orders))
        .route("/orders/lookup", get(orders::lookup_order))
        .route("/orders/:id", get(orders::get_my_order))
        .route("/orders/:id/cancel", post(orders::cancel_my_order))
        .route(
            "/addresses",
            get(addresses::list_addresses).post(addresses::create_address),
        )
        .route(
            "/addresses/:id",
            put(addresses::update_address).delete(addresses::delete_address),
        )
        .route("/addresses/:id/default", post(addresses::set_default_address))
}

/// Back-office routes. Every handler requires the admin role.
pub fn admin_routes() -> Router<AppState> {
    use handlers::{audit, coupons, inventory, orders, products};

    Router::new()
        .route("/orders", get(orders::admin_list_orders))
        .route("/orders/:id", get(orders::admin_get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        .route(
            "/orders/:id/payment-status",
            put(orders::update_payment_status),
        )
        .route("/orders/:id/cancel", post(orders::admin_cancel_order))
        .route("/customers", get(orders::list_customers))
        .route(
            "/products",
            get(products::admin_list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            put(products::update_product).delete(products::deactivate_product),
        )
        .route("/inventory/low-stock", get(inventory::low_stock))
        .route("/inventory/:product_id", put(inventory::update_stock))
        .route(
            "/coupons",
            get(coupons::list_coupons).post(coupons::create_coupon),
        )
        .route(
            "/coupons/:id",
            get(coupons::get_coupon)
                .put(coupons::update_coupon)
                .delete(coupons::delete_coupon),
        )
        .route("/audit-logs", get(audit::list_audit_logs))
        .route("/coupons/:id/deactivate", post(coupons::deactivate_coupon))
        .route("/security-events", get(audit::list_security_events))
        .route(
            "/security-events/:id/resolve",
            post(audit::resolve_security_event),
        )
        .route("/security/scan/:admin_id", post(audit::scan_admin))
        .route("/sessions", post(audit::start_session))
        .route("/sessions/:id", axum::routing::delete(audit::end_session))
}

/// Full application router with tracing, request ids, compression and a
/// request timeout. CORS is left to the binary.
pub fn app(state: AppState) -> Router {
    let timeout = state.config.request_timeout();
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/status", get(handlers::health::status))
        .nest("/api/admin", admin_routes())
        .nest("/api", public_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(if timeout.is_zero() {
            Duration::from_secs(30)
        } else {
            timeout
        }))
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        assert!(response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn pagination_counts_pages() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        let empty = PaginatedResponse::<u8>::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }
}
