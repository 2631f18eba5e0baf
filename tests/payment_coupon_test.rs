mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{
    entities::order::{self, PaymentMethod},
    errors::ServiceError,
    services::payments::{PaymentDecision, PaymentGateway},
};
use uuid::Uuid;

struct DecliningGateway;

#[async_trait]
impl PaymentGateway for DecliningGateway {
    async fn authorize(
        &self,
        _order: &order::Model,
        _method: PaymentMethod,
    ) -> Result<PaymentDecision, ServiceError> {
        Ok(PaymentDecision::Rejected)
    }
}

fn coupon_body(code: &str, discount_type: &str, value: &str) -> serde_json::Value {
    json!({
        "code": code,
        "description": "Integration coupon",
        "discount_type": discount_type,
        "discount_value": value,
        "min_purchase": "100.00",
        "max_uses": 1,
        "valid_from": (Utc::now() - Duration::days(1)).to_rfc3339(),
        "valid_until": (Utc::now() + Duration::days(7)).to_rfc3339(),
    })
}

#[tokio::test]
async fn rejected_payment_cancels_order_and_restocks() {
    let app = TestApp::with_gateway(Arc::new(DecliningGateway)).await;
    let console = app.seed_product("Game Console", dec!(3999.00), 2).await;
    let order_id = id_of(&app.place_order(&[(console, 2)]).await);
    assert_eq!(app.stock_of(console).await, 0);

    let (status, body) = app
        .as_customer(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["order_status"], "cancelled");
    assert_eq!(app.stock_of(console).await, 2);

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn an_order_is_paid_only_once() {
    let app = TestApp::new().await;
    let camera = app.seed_product("Action Camera", dec!(1899.00), 3).await;
    let order_id = id_of(&app.place_order(&[(camera, 1)]).await);

    let (status, first) = app
        .as_customer(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": order_id, "payment_method": "debit_card" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["method"], "debit_card");
    assert_eq!(first["data"]["amount"], "1899.00");
    assert!(first["data"]["transaction_id"]
        .as_str()
        .unwrap_or_default()
        .starts_with("TXN-"));

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert!(status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST);

    let (status, listed) = app.as_customer(Method::GET, "/api/v1/payments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"]["total"], 1);
}

#[tokio::test]
async fn boleto_waits_for_settlement() {
    let app = TestApp::new().await;
    let drone = app.seed_product("Drone", dec!(4500.00), 1).await;
    let (status, order) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": drone, "quantity": 1 }],
                "payment_method": "boleto",
                "installments": 6
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", order);

    let (status, order) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": drone, "quantity": 1 }],
                "payment_method": "boleto"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    assert_eq!(order["data"]["installments"], 1);
    let order_id = id_of(&order["data"]);

    let (status, payment) = app
        .as_customer(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["data"]["status"], "pending");
    assert_eq!(payment["data"]["order_status"], "pending");
    let payment_id = id_of(&payment["data"]);

    let (status, settled) = app
        .as_customer(
            Method::POST,
            &format!("/api/v1/payments/{}/simulate_approval", payment_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", settled);
    assert_eq!(settled["data"]["status"], "approved");
    assert_eq!(settled["data"]["order_status"], "paid");

    let (status, _) = app
        .as_customer(
            Method::POST,
            &format!("/api/v1/payments/{}/simulate_approval", payment_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn credit_card_installments_are_split_evenly() {
    let app = TestApp::new().await;
    let notebook = app.seed_product("Notebook", dec!(1000.00), 1).await;
    let (status, order) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": notebook, "quantity": 1 }],
                "payment_method": "credit_card",
                "installments": 3
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    assert_eq!(order["data"]["installments"], 3);
    assert_eq!(order["data"]["installment_value"], "333.33");
    assert_eq!(order["data"]["installment_display"], "3x of R$ 333.33");
}

#[tokio::test]
async fn coupon_discounts_checkout_and_is_used_up() {
    let app = TestApp::new().await;
    let monitor = app.seed_product("4K Monitor", dec!(100.00), 5).await;

    let (status, coupon) = app
        .as_admin(
            Method::POST,
            "/api/v1/coupons",
            Some(coupon_body("welcome10", "percentage", "10")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", coupon);
    assert_eq!(coupon["data"]["code"], "WELCOME10");
    assert_eq!(coupon["data"]["is_valid"], true);

    let (status, preview) = app
        .as_customer(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "Welcome10", "total": "200.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", preview);
    assert_eq!(preview["data"]["discount_amount"], "20.00");
    assert_eq!(preview["data"]["final_total"], "180.00");

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "WELCOME10", "total": "50.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, order) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": monitor, "quantity": 2 }],
                "payment_method": "pix",
                "coupon_code": "welcome10"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    assert_eq!(order["data"]["subtotal_amount"], "200.00");
    assert_eq!(order["data"]["discount_amount"], "20.00");
    assert_eq!(order["data"]["total_amount"], "180.00");

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "product_id": monitor, "quantity": 2 }],
                "payment_method": "pix",
                "coupon_code": "WELCOME10"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(monitor).await, 3);
}

#[tokio::test]
async fn coupon_administration() {
    let app = TestApp::new().await;

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/coupons",
            Some(coupon_body("NOPE", "fixed", "10.00")),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .as_admin(
            Method::POST,
            "/api/v1/coupons",
            Some(coupon_body("TOOMUCH", "percentage", "150")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, created) = app
        .as_admin(
            Method::POST,
            "/api/v1/coupons",
            Some(coupon_body("FLAT25", "fixed", "25.00")),
        )
        .await;
    let coupon_id = id_of(&created["data"]);

    let (status, _) = app
        .as_admin(
            Method::POST,
            "/api/v1/coupons",
            Some(coupon_body("flat25", "fixed", "5.00")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, toggled) = app
        .as_admin(
            Method::POST,
            &format!("/api/v1/coupons/{}/toggle_active", coupon_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["data"]["is_active"], false);
    assert_eq!(toggled["data"]["is_valid"], false);

    let (status, updated) = app
        .as_admin(
            Method::PUT,
            &format!("/api/v1/coupons/{}", coupon_id),
            Some(json!({ "discount_value": "30.00", "is_active": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["data"]["discount_value"], "30.00");

    let (_, listed) = app.as_admin(Method::GET, "/api/v1/coupons", None).await;
    assert_eq!(listed["data"]["total"], 1);

    let (status, _) = app
        .as_admin(Method::DELETE, &format!("/api/v1/coupons/{}", coupon_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn cancelling_an_unpaid_order_rejects_its_pending_payment() {
    let app = TestApp::new().await;
    let printer = app.seed_product("Laser Printer", dec!(1300.00), 2).await;

    let mut payments = Vec::new();
    for _ in 0..2 {
        let (status, order) = app
            .as_customer(
                Method::POST,
                "/api/v1/orders",
                Some(json!({
                    "items": [{ "product_id": printer, "quantity": 1 }],
                    "payment_method": "boleto"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", order);
        let order_id = id_of(&order["data"]);
        let (_, payment) = app
            .as_customer(
                Method::POST,
                "/api/v1/payments",
                Some(json!({ "order_id": order_id })),
            )
            .await;
        assert_eq!(payment["data"]["status"], "pending");
        payments.push((order_id, id_of(&payment["data"])));
    }

    let (expired_order, expired_payment) = &payments[0];
    app.expire_reservation(Uuid::parse_str(expired_order).unwrap())
        .await;
    let swept = app
        .state
        .services
        .expiry
        .cancel_expired_orders()
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let (staff_order, staff_payment) = &payments[1];
    let (status, _) = app
        .as_admin(
            Method::POST,
            &format!("/api/v1/orders/{}/update_status", staff_order),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_of(printer).await, 2);

    for payment_id in [expired_payment, staff_payment] {
        let (_, payment) = app
            .as_customer(Method::GET, &format!("/api/v1/payments/{}", payment_id), None)
            .await;
        assert_eq!(payment["data"]["status"], "rejected");

        let (status, _) = app
            .as_customer(
                Method::POST,
                &format!("/api/v1/payments/{}/simulate_approval", payment_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
