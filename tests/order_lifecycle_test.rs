mod common;

use axum::http::{Method, StatusCode};
use common::{checkout_body, money, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::entities::order::{OrderStatus, PaymentStatus};
use uuid::Uuid;

struct Placed {
    order_id: String,
    product_id: Uuid,
    customer_token: String,
}

async fn place(app: &TestApp, stock: i32, qty: i32) -> Placed {
    let product = app
        .seed_product(&format!("SKU-{}", &Uuid::new_v4().simple().to_string()[..8]), 1_250, stock)
        .await;
    let customer_token = app.customer_token(Uuid::new_v4());
    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(product.id, qty)], None)),
            Some(&customer_token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    Placed {
        order_id: body["data"]["id"].as_str().unwrap().to_string(),
        product_id: product.id,
        customer_token,
    }
}

async fn set_status(app: &TestApp, admin: &str, order_id: &str, body: Value) -> (StatusCode, Value) {
    app.call(
        Method::PUT,
        &format!("/api/admin/orders/{order_id}/status"),
        Some(body),
        Some(admin),
    )
    .await
}

#[tokio::test]
async fn order_moves_through_fulfilment() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let placed = place(&app, 6, 2).await;
    assert_eq!(app.available(placed.product_id).await, 4);

    let (status, body) = set_status(&app, &admin, &placed.order_id, json!({ "status": "processing" })).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["status"], "processing");

    let (status, body) = set_status(
        &app,
        &admin,
        &placed.order_id,
        json!({ "status": "shipped", "trackingNumber": "BLR123456789" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["trackingNumber"], "BLR123456789");

    let shipped_mail = app
        .emails()
        .into_iter()
        .find(|m| !m.attachments.is_empty())
        .expect("shipping email with invoice");
    let invoice = &shipped_mail.attachments[0];
    assert_eq!(invoice.content_type, "application/pdf");
    assert!(invoice.data.starts_with(b"%PDF-"));
    assert!(app
        .texts()
        .iter()
        .any(|t| t.message.contains("BLR123456789")));

    let (status, body) = set_status(&app, &admin, &placed.order_id, json!({ "status": "delivered" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "delivered");

    let item = app
        .state
        .services
        .inventory
        .get(placed.product_id)
        .await
        .unwrap();
    assert_eq!(item.stock_quantity, 4);
    assert_eq!(item.reserved_quantity, 0);
}

#[tokio::test]
async fn backwards_transitions_are_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let placed = place(&app, 3, 1).await;

    for status in ["processing", "shipped", "delivered"] {
        let (code, _) = set_status(&app, &admin, &placed.order_id, json!({ "status": status })).await;
        assert_eq!(code, StatusCode::OK);
    }

    let (status, body) = set_status(&app, &admin, &placed.order_id, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_status");
    assert_eq!(
        body["error"],
        "Cannot change order status from delivered to pending"
    );

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/orders/{}/cancel", placed.order_id),
            None,
            Some(&placed.customer_token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Order has already been delivered and cannot be cancelled"
    );
}

#[tokio::test]
async fn payment_capture_starts_processing() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let placed = place(&app, 3, 1).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/orders/{}/payment-status", placed.order_id),
            Some(json!({ "paymentStatus": "paid" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["status"], "processing");
}

#[tokio::test]
async fn admin_refund_of_unshipped_order_releases_stock() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let placed = place(&app, 4, 3).await;
    assert_eq!(app.available(placed.product_id).await, 1);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/orders/{}/payment-status", placed.order_id),
            Some(json!({ "paymentStatus": "refunded" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["status"], "refunded");
    assert_eq!(app.available(placed.product_id).await, 4);
}

async fn cancel_as_customer(app: &TestApp, placed: &Placed) -> (StatusCode, Value) {
    app.call(
        Method::POST,
        &format!("/api/orders/{}/cancel", placed.order_id),
        Some(json!({ "reason": "Changed my mind" })),
        Some(&placed.customer_token),
    )
    .await
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let placed = place(&app, 5, 2).await;

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/admin/orders/{}/payment-status", placed.order_id),
            Some(json!({ "paymentStatus": "paid" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = set_status(
        &app,
        &admin,
        &placed.order_id,
        json!({ "status": "shipped", "trackingNumber": "BLR987654321" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");

    let (status, body) = cancel_as_customer(&app, &placed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Order has already been shipped and cannot be cancelled"
    );

    let order_id: Uuid = placed.order_id.parse().unwrap();
    let order = app.state.services.orders.get(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.cancellation_reason.is_none());

    let item = app
        .state
        .services
        .inventory
        .get(placed.product_id)
        .await
        .unwrap();
    assert_eq!(item.stock_quantity, 5);
    assert_eq!(item.reserved_quantity, 2);
}

#[tokio::test]
async fn refunded_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let placed = place(&app, 4, 3).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/orders/{}/payment-status", placed.order_id),
            Some(json!({ "paymentStatus": "refunded" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");

    let (status, body) = cancel_as_customer(&app, &placed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Order has already been refunded");

    let order_id: Uuid = placed.order_id.parse().unwrap();
    let order = app.state.services.orders.get(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert!(order.cancellation_reason.is_none());

    let item = app
        .state
        .services
        .inventory
        .get(placed.product_id)
        .await
        .unwrap();
    assert_eq!(item.stock_quantity, 4);
    assert_eq!(item.reserved_quantity, 0);
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let placed = place(&app, 3, 1).await;
    let stranger = app.customer_token(Uuid::new_v4());

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/orders/{}", placed.order_id),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/orders/{}", placed.order_id),
            None,
            Some(&placed.customer_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["data"]["subtotal"]), Decimal::from(1_250));

    let (status, body) = app
        .call(Method::GET, "/api/orders", None, Some(&placed.customer_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = app
        .call(Method::GET, "/api/orders", None, Some(&stranger))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let app = TestApp::new().await;
    let customer = app.customer_token(Uuid::new_v4());

    let (status, body) = app
        .call(Method::GET, "/api/admin/orders", None, Some(&customer))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = app.call(Method::GET, "/api/admin/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(Method::GET, "/api/orders", None, Some("not-a-token"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_filter_orders_and_summarise_customers() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let first = place(&app, 5, 1).await;
    let second = place(&app, 5, 2).await;

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/admin/orders/{}/cancel", second.order_id),
            Some(json!({ "reason": "Payment not received" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/admin/orders?status=cancelled",
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], second.order_id.as_str());

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/admin/orders/{}", first.order_id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(Method::GET, "/api/admin/customers", None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let customers = body["data"].as_array().unwrap();
    assert_eq!(customers.len(), 1, "cancelled orders do not count: {body}");
    assert_eq!(customers[0]["orderCount"], 1);
}

#[tokio::test]
async fn admin_actions_land_in_audit_trail() {
    let app = TestApp::new().await;
    let admin_id = Uuid::new_v4();
    let admin = app.admin_token(admin_id);
    let placed = place(&app, 3, 1).await;

    let (status, _) = set_status(&app, &admin, &placed.order_id, json!({ "status": "processing" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = set_status(&app, &admin, &placed.order_id, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/admin/audit-logs?admin_id={admin_id}"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let entries = body["data"]["items"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|e| e["action"] == "order.update_status"));
    assert!(entries.iter().any(|e| e["success"] == false));
}
