mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn register_login_and_refresh() {
    let app = TestApp::new().await;

    let (status, registered) = app
        .json(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "maria",
                "email": "maria@example.com",
                "password": "s3cure-pass"
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", registered);
    assert_eq!(registered["data"]["user"]["role"], "customer");
    assert!(registered["data"]["access_token"].is_string());

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "maria",
                "email": "other@example.com",
                "password": "s3cure-pass"
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "username": "maria", "password": "wrong-pass" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = app
        .json(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "username": "maria", "password": "s3cure-pass" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", login);
    let refresh_token = login["data"]["refresh_token"].as_str().unwrap().to_string();

    let (status, refreshed) = app
        .json(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": refresh_token })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", refreshed);
    let access = refreshed["data"]["access_token"].as_str().unwrap().to_string();

    let (status, profile) = app
        .json(Method::GET, "/api/v1/auth/profile", None, Some(&access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["data"]["username"], "maria");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({ "refresh_token": refresh_token })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn short_passwords_are_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "joao",
                "email": "joao@example.com",
                "password": "short"
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_revokes_the_access_token() {
    let app = TestApp::new().await;

    let (status, _) = app.json(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::GET, "/api/v1/orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.as_customer(Method::POST, "/api/v1/auth/logout", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.as_customer(Method::GET, "/api/v1/orders", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_can_be_updated() {
    let app = TestApp::new().await;
    let (status, body) = app
        .as_customer(
            Method::PUT,
            "/api/v1/auth/profile",
            Some(json!({ "email": "new-address@example.com", "phone": "+55 11 99999-0000" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["email"], "new-address@example.com");

    let (status, _) = app
        .as_customer(
            Method::PUT,
            "/api/v1/auth/profile",
            Some(json!({ "email": "admin@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let app = TestApp::new().await;
    let (status, body) = app.json(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");

    let (status, body) = app.json(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, _) = app
        .json(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
