mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::services::maintenance;

#[tokio::test]
async fn reset_returns_only_stock_still_reserved() {
    let app = TestApp::new().await;
    let monitor = app.seed_product("Ultrawide Monitor", dec!(2800.00), 10).await;

    app.place_order(&[(monitor, 2)]).await;

    let cancelled = id_of(&app.place_order(&[(monitor, 1)]).await);
    let (status, _) = app
        .as_customer(Method::POST, &format!("/api/v1/orders/{}/cancel", cancelled), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let collected = id_of(&app.place_order(&[(monitor, 1)]).await);
    app.as_customer(
        Method::POST,
        "/api/v1/payments",
        Some(json!({ "order_id": collected })),
    )
    .await;
    for next in ["processing", "ready"] {
        app.as_admin(
            Method::POST,
            &format!("/api/v1/orders/{}/update_status", collected),
            Some(json!({ "status": next })),
        )
        .await;
    }
    let (status, body) = app
        .as_admin(
            Method::POST,
            &format!("/api/v1/orders/{}/manual_release", collected),
            Some(json!({ "reason": "Collected by a relative with ID" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(app.stock_of(monitor).await, 7);

    let summary = maintenance::reset_orders(&app.state.db).await.unwrap();
    assert_eq!(summary.orders_deleted, 3);
    assert_eq!(summary.payments_deleted, 1);
    assert_eq!(summary.units_restocked, 2);
    assert_eq!(app.stock_of(monitor).await, 9);

    let (_, orders) = app.as_admin(Method::GET, "/api/v1/orders", None).await;
    assert_eq!(orders["data"]["total"], 0);
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let app = TestApp::new().await;

    let first = maintenance::seed(app.state.db.clone()).await.unwrap();
    assert!(first.users_created.is_empty(), "harness already created both accounts");
    assert_eq!(first.categories_created.len(), 5);
    assert_eq!(first.products_created.len(), 10);

    let second = maintenance::seed(app.state.db.clone()).await.unwrap();
    assert!(second.categories_created.is_empty());
    assert!(second.products_created.is_empty());

    let (_, products) = app.json(Method::GET, "/api/v1/products", None, None).await;
    assert_eq!(products["data"]["total"], 10);
    let (_, categories) = app.json(Method::GET, "/api/v1/categories", None, None).await;
    assert_eq!(categories["data"].as_array().map(Vec::len), Some(5));
}
