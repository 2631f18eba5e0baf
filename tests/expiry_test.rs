mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::metrics;
use uuid::Uuid;

#[tokio::test]
async fn sweeper_cancels_stale_reservations() {
    let app = TestApp::new().await;
    let console = app.seed_product("Handheld Console", dec!(2200.00), 3).await;
    let stale = id_of(&app.place_order(&[(console, 2)]).await);
    let fresh = id_of(&app.place_order(&[(console, 1)]).await);
    assert_eq!(app.stock_of(console).await, 0);

    app.expire_reservation(Uuid::parse_str(&stale).unwrap()).await;
    let restocked_before = metrics::counter_value("stock_units_restocked_total");

    let cancelled = app
        .state
        .services
        .expiry
        .cancel_expired_orders()
        .await
        .unwrap();
    assert_eq!(cancelled, 1);
    assert_eq!(app.stock_of(console).await, 2);
    assert!(metrics::counter_value("stock_units_restocked_total") >= restocked_before + 2);

    let again = app
        .state
        .services
        .expiry
        .cancel_expired_orders()
        .await
        .unwrap();
    assert_eq!(again, 0);

    let response = app.request(Method::GET, "/metrics", None, None).await;
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("# TYPE pending_reservations gauge"));

    let (_, body) = app
        .as_customer(Method::GET, &format!("/api/v1/orders/{}", fresh), None)
        .await;
    assert_eq!(body["data"]["status"], "pending");
}

#[tokio::test]
async fn reading_an_expired_order_cancels_it() {
    let app = TestApp::new().await;
    let lens = app.seed_product("Camera Lens", dec!(3100.00), 1).await;
    let order_id = id_of(&app.place_order(&[(lens, 1)]).await);
    app.expire_reservation(Uuid::parse_str(&order_id).unwrap()).await;

    let (status, body) = app
        .as_customer(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["status_history"][0]["note"], "Reservation expired");
    assert_eq!(app.stock_of(lens).await, 1);
}

#[tokio::test]
async fn expired_orders_cannot_be_paid() {
    let app = TestApp::new().await;
    let router = app.seed_product("Wi-Fi Router", dec!(450.00), 2).await;
    let order_id = id_of(&app.place_order(&[(router, 2)]).await);
    app.expire_reservation(Uuid::parse_str(&order_id).unwrap()).await;

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(router).await, 2);

    let (_, listed) = app.as_customer(Method::GET, "/api/v1/payments", None).await;
    assert_eq!(listed["data"]["total"], 0);
}
