mod common;

use axum::http::{Method, StatusCode};
use common::{money, TestApp};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn catalogue_hides_inactive_products() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let ring = app.seed_product("RING-P1", 1_999, 4).await;
    let retired = app.seed_product("RING-P2", 2_499, 4).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/products/{}", retired.id),
            Some(json!({ "isActive": false })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");

    let (status, body) = app.call(Method::GET, "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], ring.id.to_string());
    assert_eq!(money(&items[0]["price"]), Decimal::from(1_999));
    assert_eq!(items[0]["inStock"], true);

    let (status, _) = app
        .call(Method::GET, &format!("/api/products/{}", retired.id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/admin/products?include_inactive=true",
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn admin_creates_products_with_stock() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/admin/products",
            Some(json!({
                "sku": "NECK-P3",
                "name": "Temple necklace",
                "category": "necklaces",
                "price": "45999.50",
                "initialStock": 2
            })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    assert_eq!(body["data"]["availableQuantity"], 2);
    assert_eq!(money(&body["data"]["price"]), "45999.50".parse::<Decimal>().unwrap());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/admin/products",
            Some(json!({ "sku": "NECK-P4", "name": "Bad price", "price": "0" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected body: {body}");

    let (status, body) = app
        .call(Method::GET, "/api/products?category=necklaces", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn health_and_status_report_components() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");

    let (status, body) = app.call(Method::GET, "/api/status", None, None).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
    assert_eq!(body["email_configured"], true);
    assert_eq!(body["sms_configured"], true);
}

#[tokio::test]
async fn deactivating_a_product_hides_it() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let bangle = app.seed_product("BANG-P5", 3_200, 6).await;

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/admin/products/{}", bangle.id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["isActive"], false);

    let (status, _) = app
        .call(Method::GET, &format!("/api/products/{}", bangle.id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let customer = app.customer_token(Uuid::new_v4());
    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/admin/products/{}", bangle.id),
            None,
            Some(&customer),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
