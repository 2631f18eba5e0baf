mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn anonymous_shoppers_only_see_active_products() {
    let app = TestApp::new().await;
    let visible = app.seed_product("Noise Cancelling Headphones", dec!(2499.00), 5).await;
    let hidden = app.seed_product("Discontinued Tablet", dec!(999.00), 3).await;

    let (status, _) = app
        .as_admin(
            Method::POST,
            &format!("/api/v1/products/{}/toggle_active", hidden),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.json(Method::GET, "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], visible.to_string());

    let (status, _) = app
        .json(Method::GET, &format!("/api/v1/products/{}", hidden), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.as_admin(Method::GET, "/api/v1/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    let (status, body) = app
        .as_admin(Method::GET, "/api/v1/products?active_status=inactive", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["id"], hidden.to_string());
}

#[tokio::test]
async fn product_filters_combine() {
    let app = TestApp::new().await;
    app.seed_product("Gaming Mouse", dec!(350.00), 4).await;
    app.seed_product("Office Mouse", dec!(80.00), 0).await;
    app.seed_product("Mechanical Keyboard", dec!(600.00), 2).await;

    let (_, body) = app
        .json(Method::GET, "/api/v1/products?search=MOUSE", None, None)
        .await;
    assert_eq!(body["data"]["total"], 2);

    let (_, body) = app
        .json(
            Method::GET,
            "/api/v1/products?search=mouse&stock_status=in_stock",
            None,
            None,
        )
        .await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Gaming Mouse");

    let (_, body) = app
        .json(
            Method::GET,
            "/api/v1/products?min_price=100&max_price=500",
            None,
            None,
        )
        .await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Gaming Mouse");

    let (_, body) = app
        .json(Method::GET, "/api/v1/products?stock_status=out_of_stock", None, None)
        .await;
    assert_eq!(body["data"]["items"][0]["in_stock"], false);
}

#[tokio::test]
async fn categories_count_products_and_release_them_on_delete() {
    let app = TestApp::new().await;
    let (status, category) = app
        .as_admin(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "Audio", "description": "Speakers and headphones" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", category);
    let category_id = id_of(&category["data"]);

    let (status, _) = app
        .as_admin(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "audio" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, product) = app
        .as_admin(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "name": "Portable Speaker",
                "price": "699.00",
                "stock": 12,
                "category_id": category_id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", product);
    assert_eq!(product["data"]["category_name"], "Audio");

    let (_, categories) = app.json(Method::GET, "/api/v1/categories", None, None).await;
    assert_eq!(categories["data"][0]["product_count"], 1);

    let (status, _) = app
        .as_admin(
            Method::DELETE,
            &format!("/api/v1/categories/{}", category_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, reloaded) = app
        .json(
            Method::GET,
            &format!("/api/v1/products/{}", id_of(&product["data"])),
            None,
            None,
        )
        .await;
    assert!(reloaded["data"]["category_id"].is_null());
}

#[tokio::test]
async fn catalog_writes_are_staff_only_and_validated() {
    let app = TestApp::new().await;

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Bootleg", "price": "1.00", "stock": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "Anonymous" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .as_admin(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Free TV", "price": "0", "stock": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ordered_products_cannot_be_deleted() {
    let app = TestApp::new().await;
    let charger = app.seed_product("Fast Charger", dec!(149.00), 8).await;
    app.place_order(&[(charger, 1)]).await;

    let (status, _) = app
        .as_admin(Method::DELETE, &format!("/api/v1/products/{}", charger), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .as_admin(
            Method::PUT,
            &format!("/api/v1/products/{}", charger),
            Some(json!({ "stock": 20, "price": "139.90" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["stock"], 20);
    assert_eq!(body["data"]["price"], "139.90");
}
