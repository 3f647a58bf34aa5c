mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::TestApp;
use futures::future::join_all;
use serde_json::json;
use storefront_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let app = TestApp::new().await;
    let product = app.seed_product("RING-CONC", 1_000, 10).await;
    let inventory = app.state.services.inventory.clone();

    let attempts = (0..20).map(|_| {
        let inventory = inventory.clone();
        let product_id = product.id;
        tokio::spawn(async move { inventory.reserve(product_id, 1).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 10);
    for failure in results.iter().filter(|r| r.is_err()) {
        assert_matches!(failure, Err(ServiceError::InsufficientStock(_)));
    }

    let item = inventory.get(product.id).await.unwrap();
    assert_eq!(item.reserved_quantity, 10);
    assert_eq!(item.available(), 0);
}

#[tokio::test]
async fn release_never_goes_negative() {
    let app = TestApp::new().await;
    let product = app.seed_product("RING-REL", 1_000, 5).await;
    let inventory = &app.state.services.inventory;

    inventory.reserve(product.id, 2).await.unwrap();
    inventory.release(product.id, 5).await.unwrap();

    let item = inventory.get(product.id).await.unwrap();
    assert_eq!(item.reserved_quantity, 0);
    assert_eq!(item.stock_quantity, 5);
}

#[tokio::test]
async fn confirm_consumes_stock_and_reservation() {
    let app = TestApp::new().await;
    let product = app.seed_product("RING-CONF", 1_000, 5).await;
    let inventory = &app.state.services.inventory;

    inventory.reserve(product.id, 3).await.unwrap();
    inventory.confirm(product.id, 3).await.unwrap();

    let item = inventory.get(product.id).await.unwrap();
    assert_eq!(item.stock_quantity, 2);
    assert_eq!(item.reserved_quantity, 0);
}

#[tokio::test]
async fn reserve_all_rolls_back_partial_holds() {
    let app = TestApp::new().await;
    let plenty = app.seed_product("CHAIN-RA", 1_000, 10).await;
    let scarce = app.seed_product("BANGLE-RA", 1_000, 1).await;
    let inventory = &app.state.services.inventory;

    let result = inventory
        .reserve_all(&[(plenty.id, 4), (scarce.id, 2)])
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    assert_eq!(app.available(plenty.id).await, 10);
    assert_eq!(app.available(scarce.id).await, 1);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let result = app.state.services.inventory.reserve(Uuid::new_v4(), 1).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn admin_restock_and_low_stock_report() {
    let app = TestApp::new().await;
    let admin = app.admin_token(Uuid::new_v4());
    let product = app.seed_product("EAR-LOW", 700, 2).await;

    let (status, body) = app
        .call(Method::GET, "/api/admin/inventory/low-stock", None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["productId"] == product.id.to_string()));

    app.state
        .services
        .inventory
        .reserve(product.id, 1)
        .await
        .unwrap();
    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/inventory/{}", product.id),
            Some(json!({ "stockQuantity": 0 })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "stock below reservations: {body}");

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/admin/inventory/{}", product.id),
            Some(json!({ "stockQuantity": 25, "reorderPoint": 3 })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["data"]["stockQuantity"], 25);
    assert_eq!(body["data"]["available"], 24);
    assert_eq!(body["data"]["reorderPoint"], 3);
}
