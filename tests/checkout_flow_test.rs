mod common;

use std::sync::atomic::Ordering;

use axum::http::{Method, StatusCode};
use common::{checkout_body, money, TestApp};
use assert_matches::assert_matches;
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::json;
use storefront_api::{
    entities::cart::{CartStatus, Entity as Cart},
    errors::ServiceError,
};
use uuid::Uuid;

async fn create_coupon(app: &TestApp, body: serde_json::Value) {
    let admin = app.admin_token(Uuid::new_v4());
    let (status, created) = app
        .call(Method::POST, "/api/admin/coupons", Some(body), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::CREATED, "coupon create failed: {created}");
}

#[tokio::test]
async fn guest_checkout_computes_gst_and_free_shipping() {
    let app = TestApp::new().await;
    let ring = app.seed_product("RING-001", 1_000, 5).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(ring.id, 2)], None)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");

    let order = &body["data"];
    assert_eq!(money(&order["subtotal"]), Decimal::from(2_000));
    assert_eq!(money(&order["tax"]), Decimal::from(360));
    assert_eq!(money(&order["shipping"]), Decimal::ZERO);
    assert_eq!(money(&order["discount"]), Decimal::ZERO);
    assert_eq!(money(&order["total"]), Decimal::from(2_360));
    assert_eq!(order["status"], "pending");
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["isGuest"], true);
    assert!(order["customerId"]
        .as_str()
        .unwrap()
        .starts_with("guest_"));
    assert!(order["confirmationNumber"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    assert_eq!(app.available(ring.id).await, 3);

    let emails = app.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "asha@example.com");
    let texts = app.texts();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].phone_number, "+919876543210");
}

#[tokio::test]
async fn small_orders_pay_shipping() {
    let app = TestApp::new().await;
    let studs = app.seed_product("EAR-001", 500, 10).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(studs.id, 1)], None)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let order = &body["data"];
    assert_eq!(money(&order["subtotal"]), Decimal::from(500));
    assert_eq!(money(&order["tax"]), Decimal::from(90));
    assert_eq!(money(&order["shipping"]), Decimal::from(100));
    assert_eq!(money(&order["total"]), Decimal::from(690));
}

#[tokio::test]
async fn percentage_coupon_is_capped() {
    let app = TestApp::new().await;
    let ring = app.seed_product("RING-002", 1_000, 5).await;
    create_coupon(
        &app,
        json!({
            "code": "SAVE10",
            "discountType": "percentage",
            "discountValue": "10",
            "maximumDiscountAmount": "150"
        }),
    )
    .await;

    let customer = Uuid::new_v4();
    let token = app.customer_token(customer);
    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(ring.id, 2)], Some("save10"))),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");

    let order = &body["data"];
    assert_eq!(money(&order["discount"]), Decimal::from(150));
    assert_eq!(money(&order["tax"]), Decimal::from(360));
    assert_eq!(money(&order["total"]), Decimal::from(2_210));
    assert_eq!(order["couponCode"], "SAVE10");
    assert_eq!(order["customerId"], customer.to_string());

    let coupon = app
        .state
        .services
        .coupons
        .find_by_code("SAVE10")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.usage_count, 1);
}

#[tokio::test]
async fn restricted_coupon_asks_guests_to_sign_in() {
    let app = TestApp::new().await;
    let ring = app.seed_product("RING-003", 1_000, 5).await;
    create_coupon(
        &app,
        json!({
            "code": "VIPONLY",
            "discountType": "fixed_amount",
            "discountValue": "200",
            "allowedUsers": [Uuid::new_v4()]
        }),
    )
    .await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(ring.id, 1)], Some("VIPONLY"))),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("Please sign in"));

    assert_eq!(app.available(ring.id).await, 5);
    assert!(app.emails().is_empty());
}

#[tokio::test]
async fn cancelling_releases_stock_and_survives_notification_failure() {
    let app = TestApp::new().await;
    let necklace = app.seed_product("NECK-001", 3_500, 5).await;
    app.email.fail.store(true, Ordering::SeqCst);
    app.sms.fail.store(true, Ordering::SeqCst);

    let customer = Uuid::new_v4();
    let token = app.customer_token(customer);
    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(necklace.id, 2)], None)),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "order must survive provider outage");
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(app.available(necklace.id).await, 3);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/orders/{order_id}/cancel"),
            Some(json!({ "reason": "Ordered the wrong size" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["cancellationReason"], "Ordered the wrong size");
    assert_eq!(app.available(necklace.id).await, 5);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/orders/{order_id}/cancel"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Order is already cancelled");
    assert_eq!(app.available(necklace.id).await, 5);
}

#[tokio::test]
async fn insufficient_stock_leaves_inventory_untouched() {
    let app = TestApp::new().await;
    let bangle = app.seed_product("BANG-001", 800, 2).await;
    let chain = app.seed_product("CHAIN-001", 1_200, 10).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(chain.id, 1), (bangle.id, 3)], None)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "insufficient_stock");
    assert_eq!(app.available(bangle.id).await, 2);
    assert_eq!(app.available(chain.id).await, 10);
}

#[tokio::test]
async fn guest_can_track_order_with_contact_details() {
    let app = TestApp::new().await;
    let ring = app.seed_product("RING-004", 1_500, 3).await;

    let (_, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(ring.id, 1)], None)),
            None,
        )
        .await;
    let confirmation = body["data"]["confirmationNumber"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, found) = app
        .call(
            Method::GET,
            &format!(
                "/api/orders/lookup?confirmation_number={}&email=ASHA%40example.com&phone=%2B91%2098765%2043210",
                confirmation.to_lowercase()
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {found}");
    assert_eq!(found["data"]["confirmationNumber"], confirmation);

    let (status, _) = app
        .call(
            Method::GET,
            &format!(
                "/api/orders/lookup?confirmation_number={}&email=asha%40example.com&phone=9999999999",
                confirmation
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn same_guest_contact_maps_to_same_customer() {
    let app = TestApp::new().await;
    let ring = app.seed_product("RING-005", 900, 10).await;

    let mut ids = Vec::new();
    for _ in 0..2 {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/checkout",
                Some(checkout_body(&[(ring.id, 1)], None)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["data"]["customerId"].as_str().unwrap().to_string());
    }
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[0].len(), "guest_".len() + 24);
}

#[tokio::test]
async fn checkout_from_guest_cart_converts_it() {
    let app = TestApp::new().await;
    let pendant = app.seed_product("PEND-001", 2_500, 4).await;
    let session = "guest-session-123";

    let (status, cart) = app
        .call_as_guest(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": pendant.id, "quantity": 1 })),
            session,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {cart}");
    let cart_id = cart["data"]["id"].as_str().unwrap().to_string();

    let mut body = checkout_body(&[], None);
    body["items"] = json!([]);
    body["cartId"] = json!(cart_id);
    let (status, order) = app
        .call_as_guest(Method::POST, "/api/checkout", Some(body), session)
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {order}");
    assert_eq!(money(&order["data"]["subtotal"]), Decimal::from(2_500));
    assert_eq!(money(&order["data"]["shipping"]), Decimal::ZERO);

    let (_, cart) = app
        .call_as_guest(Method::GET, "/api/cart", None, session)
        .await;
    assert_ne!(cart["data"]["id"].as_str().unwrap(), cart_id);
    assert_eq!(cart["data"]["itemCount"], 0);

    let cart_uuid: Uuid = cart_id.parse().unwrap();
    let stored = Cart::find_by_id(cart_uuid)
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("converted cart is kept");
    assert_eq!(stored.status, CartStatus::Converted);
}

#[tokio::test]
async fn converted_cart_cannot_be_checked_out_again() {
    let app = TestApp::new().await;
    let ring = app.seed_product("RING-CONV", 1_800, 5).await;
    let session = "guest-session-twice";

    let (status, cart) = app
        .call_as_guest(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": ring.id, "quantity": 2 })),
            session,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {cart}");
    let cart_id = cart["data"]["id"].as_str().unwrap().to_string();

    let mut body = checkout_body(&[], None);
    body["items"] = json!([]);
    body["cartId"] = json!(cart_id);
    let (status, order) = app
        .call_as_guest(Method::POST, "/api/checkout", Some(body.clone()), session)
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {order}");
    assert_eq!(app.available(ring.id).await, 3);

    let (status, again) = app
        .call_as_guest(Method::POST, "/api/checkout", Some(body), session)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected body: {again}");
    assert_eq!(again["error"], "Cart is no longer active");
    assert_eq!(app.available(ring.id).await, 3);

    let (_, orders) = app
        .call(
            Method::GET,
            "/api/admin/orders",
            None,
            Some(&app.admin_token(Uuid::new_v4())),
        )
        .await;
    assert_eq!(orders["data"]["total"], 1);
}

#[tokio::test]
async fn cart_conversion_only_succeeds_once() {
    let app = TestApp::new().await;
    let earring = app.seed_product("EAR-ONCE", 900, 2).await;
    let session = "guest-session-once";
    let (_, cart) = app
        .call_as_guest(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "productId": earring.id, "quantity": 1 })),
            session,
        )
        .await;
    let cart_id: Uuid = cart["data"]["id"].as_str().unwrap().parse().unwrap();

    let carts = &app.state.services.carts;
    carts
        .mark_converted(&*app.state.db, cart_id)
        .await
        .expect("first conversion");
    let second = carts.mark_converted(&*app.state.db, cart_id).await;
    assert_matches!(
        second,
        Err(ServiceError::InvalidOperation(message)) if message == "Cart is no longer active"
    );
}
