mod common;

use axum::http::{Method, StatusCode};
use common::{checkout_body, money, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

async fn create(app: &TestApp, admin: &str, body: Value) -> Value {
    let (status, created) = app
        .call(Method::POST, "/api/admin/coupons", Some(body), Some(admin))
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {created}");
    created["data"].clone()
}

async fn validate(app: &TestApp, token: Option<&str>, body: Value) -> Value {
    let (status, result) = app
        .call(Method::POST, "/api/coupons/validate", Some(body), token)
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {result}");
    result["data"].clone()
}

#[tokio::test]
async fn admin_manages_coupons() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());

    let coupon = create(
        &app,
        &admin,
        json!({
            "code": "diwali-25",
            "description": "Festive offer",
            "discountType": "percentage",
            "discountValue": "12.5",
            "minimumOrderAmount": "1000"
        }),
    )
    .await;
    assert_eq!(coupon["code"], "DIWALI-25");
    assert_eq!(money(&coupon["discountValue"]), "12.5".parse::<Decimal>().unwrap());
    let id = coupon["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/admin/coupons",
            Some(json!({ "code": "DIWALI-25", "discountType": "fixed_amount", "discountValue": "50" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "duplicate code: {body}");

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/coupons/{id}"),
            Some(json!({ "usageLimit": 100, "isActive": false })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["usageLimit"], 100);
    assert_eq!(body["data"]["isActive"], false);

    let (status, body) = app
        .call(Method::GET, "/api/admin/coupons", None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/admin/coupons/{id}"), None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(Method::GET, &format!("/api/admin/coupons/{id}"), None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejects_malformed_coupon_definitions() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/admin/coupons",
            Some(json!({ "code": "TOO-MUCH", "discountType": "percentage", "discountValue": "150" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/admin/coupons",
            Some(json!({ "code": "x", "discountType": "fixed_amount", "discountValue": "10" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validation_explains_rejections() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    create(
        &app,
        &admin,
        json!({
            "code": "BIGSPEND",
            "discountType": "fixed_amount",
            "discountValue": "300",
            "minimumOrderAmount": "5000"
        }),
    )
    .await;

    let result = validate(&app, None, json!({ "code": "NOPE", "subtotal": "1000" })).await;
    assert_eq!(result["valid"], false);
    assert_eq!(result["message"], "Invalid coupon code");

    let result = validate(&app, None, json!({ "code": "bigspend", "subtotal": "4999.99" })).await;
    assert_eq!(result["valid"], false);
    assert!(result["message"]
        .as_str()
        .unwrap()
        .starts_with("Minimum order amount of ₹5000"));

    let result = validate(&app, None, json!({ "code": "BIGSPEND", "subtotal": "5000" })).await;
    assert_eq!(result["valid"], true);
    assert_eq!(money(&result["discount"]), Decimal::from(300));
    assert_eq!(result["code"], "BIGSPEND");
}

#[tokio::test]
async fn expired_coupon_is_refused() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    create(
        &app,
        &admin,
        json!({
            "code": "OLDOFFER",
            "discountType": "fixed_amount",
            "discountValue": "100",
            "validUntil": "2020-01-01T00:00:00Z"
        }),
    )
    .await;

    let result = validate(&app, None, json!({ "code": "OLDOFFER", "subtotal": "2000" })).await;
    assert_eq!(result["valid"], false);
    assert_eq!(result["message"], "This coupon has expired");
}

#[tokio::test]
async fn product_scoped_coupons_check_the_cart() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let ring = app.seed_product("RING-SC", 1_000, 5).await;
    let chain = app.seed_product("CHAIN-SC", 1_000, 5).await;
    create(
        &app,
        &admin,
        json!({
            "code": "RINGS20",
            "discountType": "percentage",
            "discountValue": "20",
            "applicableProducts": [ring.id]
        }),
    )
    .await;
    create(
        &app,
        &admin,
        json!({
            "code": "NOCHAIN",
            "discountType": "fixed_amount",
            "discountValue": "50",
            "excludedProducts": [chain.id]
        }),
    )
    .await;

    let result = validate(
        &app,
        None,
        json!({ "code": "RINGS20", "subtotal": "1000", "productIds": [chain.id] }),
    )
    .await;
    assert_eq!(
        result["message"],
        "This coupon is not applicable to the products in your cart"
    );

    let result = validate(
        &app,
        None,
        json!({ "code": "RINGS20", "subtotal": "1000", "productIds": [ring.id] }),
    )
    .await;
    assert_eq!(money(&result["discount"]), Decimal::from(200));

    let result = validate(
        &app,
        None,
        json!({ "code": "NOCHAIN", "subtotal": "2000", "productIds": [ring.id, chain.id] }),
    )
    .await;
    assert_eq!(
        result["message"],
        "This coupon cannot be applied to some products in your cart"
    );
}

#[tokio::test]
async fn per_user_limit_counts_completed_orders() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let ring = app.seed_product("RING-UL", 1_000, 10).await;
    create(
        &app,
        &admin,
        json!({
            "code": "ONCEONLY",
            "discountType": "fixed_amount",
            "discountValue": "100",
            "userUsageLimit": 1
        }),
    )
    .await;

    let customer = app.customer_token(Uuid::new_v4());
    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(ring.id, 1)], Some("ONCEONLY"))),
            Some(&customer),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    assert_eq!(money(&body["data"]["discount"]), Decimal::from(100));

    let (status, body) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(checkout_body(&[(ring.id, 1)], Some("ONCEONLY"))),
            Some(&customer),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "You have already used this coupon the maximum number of times"
    );
    assert_eq!(app.available(ring.id).await, 9);

    let someone_else = app.customer_token(Uuid::new_v4());
    let result = validate(
        &app,
        Some(&someone_else),
        json!({ "code": "ONCEONLY", "subtotal": "1000" }),
    )
    .await;
    assert_eq!(result["valid"], true);
}

#[tokio::test]
async fn excluded_user_is_not_eligible() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let blocked = Uuid::new_v4();
    create(
        &app,
        &admin,
        json!({
            "code": "STAFFNO",
            "discountType": "fixed_amount",
            "discountValue": "100",
            "excludedUsers": [blocked]
        }),
    )
    .await;

    let token = app.customer_token(blocked);
    let result = validate(&app, Some(&token), json!({ "code": "STAFFNO", "subtotal": "1000" })).await;
    assert_eq!(result["message"], "This coupon is not available for your account");
}

#[tokio::test]
async fn deactivated_coupon_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let coupon = create(
        &app,
        &admin,
        json!({ "code": "FLASH50", "discountType": "fixed_amount", "discountValue": "50" }),
    )
    .await;

    // warm the cache so deactivation must invalidate it
    let result = validate(&app, None, json!({ "code": "FLASH50", "subtotal": "1000" })).await;
    assert_eq!(result["valid"], true);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/admin/coupons/{}/deactivate", coupon["id"].as_str().unwrap()),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["isActive"], false);

    let result = validate(&app, None, json!({ "code": "FLASH50", "subtotal": "1000" })).await;
    assert_eq!(result["valid"], false);
    assert_eq!(result["message"], "This coupon is no longer active");
}

#[tokio::test]
async fn null_clears_optional_coupon_limits() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let vip = Uuid::new_v4();
    let coupon = create(
        &app,
        &admin,
        json!({
            "code": "VIP20",
            "discountType": "percentage",
            "discountValue": "20",
            "maximumDiscountAmount": "500",
            "validUntil": "2099-01-01T00:00:00Z",
            "usageLimit": 10,
            "allowedUsers": [vip]
        }),
    )
    .await;
    let id = coupon["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/coupons/{id}"),
            Some(json!({
                "maximumDiscountAmount": null,
                "validUntil": null,
                "usageLimit": null,
                "allowedUsers": null
            })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    let data = &body["data"];
    assert!(data["maximumDiscountAmount"].is_null());
    assert!(data["validUntil"].is_null());
    assert!(data["usageLimit"].is_null());
    assert_eq!(data["allowedUsers"], json!([]));
    // omitted fields keep their values
    assert_eq!(money(&data["discountValue"]), Decimal::from(20));
    assert_eq!(data["isActive"], true);

    // anyone may use it now, and the 20% is no longer capped at 500
    let result = validate(&app, None, json!({ "code": "VIP20", "subtotal": "10000" })).await;
    assert_eq!(result["valid"], true, "unexpected result: {result}");
    assert_eq!(money(&result["discount"]), Decimal::from(2000));
}
