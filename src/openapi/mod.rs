use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Backend for a jewelry storefront: catalogue, carts, checkout, order tracking,
coupons and the admin back office.

## Authentication

Customer and admin endpoints take a bearer token from the identity provider:

```
Authorization: Bearer <jwt>
```

Guests may browse, keep a cart (identified by the `x-session-id` header) and
check out without a token. Guest orders are looked up by confirmation number,
email and phone.

## Money

All amounts are rupees with two decimal places. GST is 18% of the subtotal;
shipping is free from ₹2,000.

## Errors

```json
{
  "success": false,
  "error": "This coupon has expired",
  "code": "validation_error",
  "request_id": "2b0f...",
  "timestamp": "2025-01-09T10:30:00Z"
}
```
        "#,
    ),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "products", description = "Public catalogue"),
        (name = "coupons", description = "Coupon validation"),
        (name = "cart", description = "Customer and guest carts"),
        (name = "orders", description = "Checkout and order tracking"),
        (name = "addresses", description = "Customer address book"),
        (name = "admin", description = "Back office, admin role required")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::status,

        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::coupons::validate_coupon,

        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::merge_cart,

        crate::handlers::orders::checkout,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_my_order,
        crate::handlers::orders::cancel_my_order,
        crate::handlers::orders::lookup_order,

        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::update_address,
        crate::handlers::addresses::delete_address,
        crate::handlers::addresses::set_default_address,

        crate::handlers::orders::admin_list_orders,
        crate::handlers::orders::admin_get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::update_payment_status,
        crate::handlers::orders::admin_cancel_order,
        crate::handlers::orders::list_customers,
        crate::handlers::products::admin_list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::deactivate_product,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::update_stock,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::deactivate_coupon,
        crate::handlers::coupons::delete_coupon,
        crate::handlers::audit::list_audit_logs,
        crate::handlers::audit::list_security_events,
        crate::handlers::audit::resolve_security_event,
        crate::handlers::audit::scan_admin,
        crate::handlers::audit::start_session,
        crate::handlers::audit::end_session,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::ResponseMeta,
            crate::services::pricing::TotalsView,
            crate::services::orders::CheckoutItem,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::security_event::Severity,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
