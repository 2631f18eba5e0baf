mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use serde_json::json;
use storefront_api::entities::order;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let app = TestApp::new().await;
    let console = app.seed_product("Game Console", dec!(3999.00), 3).await;
    let body = json!({
        "items": [{ "product_id": console, "quantity": 1 }],
        "payment_method": "pix"
    });

    let checkout = || app.as_customer(Method::POST, "/api/v1/orders", Some(body.clone()));
    let (a, b, c, d, e) = tokio::join!(checkout(), checkout(), checkout(), checkout(), checkout());
    let statuses = [a.0, b.0, c.0, d.0, e.0];

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let refused = statuses
        .iter()
        .filter(|s| **s == StatusCode::UNPROCESSABLE_ENTITY)
        .count();
    assert_eq!(created, 3, "{:?}", statuses);
    assert_eq!(refused, 2, "{:?}", statuses);
    assert_eq!(app.stock_of(console).await, 0);
}

#[tokio::test]
async fn open_orders_cannot_share_a_pickup_code() {
    let app = TestApp::new().await;
    let tablet = app.seed_product("Tablet", dec!(1899.00), 5).await;
    let first = id_of(&app.place_order(&[(tablet, 1)]).await);
    let first_id = Uuid::parse_str(&first).unwrap();

    let existing = order::Entity::find_by_id(first_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let duplicate = || {
        let mut copy = existing.clone().into_active_model();
        copy.id = Set(Uuid::new_v4());
        copy.reset_all()
    };

    let clash = duplicate().insert(&*app.state.db).await;
    assert!(clash.is_err(), "second open order reused {}", existing.pickup_code);

    let (status, _) = app
        .as_customer(Method::POST, &format!("/api/v1/orders/{}/cancel", first), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let reused = duplicate().insert(&*app.state.db).await.unwrap();
    assert_eq!(reused.pickup_code, existing.pickup_code);
}
