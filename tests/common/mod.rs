#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde_json::Value;
use storefront_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{
        order, product,
        user::{self, UserRole},
    },
    events::{self, EventSender},
    services::{
        catalog::CreateProductRequest,
        payments::{PaymentGateway, SimulatedGateway},
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application harness backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_token: String,
    pub customer_token: String,
    pub customer_id: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Payments are always approved.
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(SimulatedGateway::new(1.0))).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let db_dir = TempDir::new().expect("temp dir for test database");
        let db_path = db_dir.path().join("storefront.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.expiry_sweep_interval_secs = 0;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db_arc, cfg, Some(event_sender), gateway);
        let router = app_router(state.clone());

        let mut app = Self {
            router,
            state,
            admin_token: String::new(),
            customer_token: String::new(),
            customer_id: Uuid::nil(),
            _event_task: event_task,
            _db_dir: db_dir,
        };

        let (_, admin_token) = app.create_user("admin", UserRole::Admin).await;
        let (customer_id, customer_token) = app.create_user("customer", UserRole::Customer).await;
        app.admin_token = admin_token;
        app.customer_token = customer_token;
        app.customer_id = customer_id;
        app
    }

    /// Inserts an account directly and issues it a token, skipping password hashing.
    pub async fn create_user(&self, username: &str, role: UserRole) -> (Uuid, String) {
        let now = Utc::now();
        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            email: Set(format!("{}@example.com", username)),
            password_hash: Set("not-a-real-hash".to_string()),
            role: Set(role),
            phone: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert test user");

        let tokens = self
            .state
            .auth
            .generate_token(&account)
            .expect("token for test user");
        (account.id, tokens.access_token)
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        self.state
            .services
            .catalog
            .create_product(CreateProductRequest {
                name: name.to_string(),
                description: format!("{} for integration tests", name),
                price,
                stock,
                category_id: None,
                image: None,
                is_active: true,
            })
            .await
            .expect("seed product")
            .id
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }

    /// Moves an order's reservation deadline into the past.
    pub async fn expire_reservation(&self, order_id: Uuid) {
        let found = order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists");
        let mut active: order::ActiveModel = found.into();
        active.expires_at = Set(Utc::now() - Duration::minutes(1));
        active
            .update(&*self.state.db)
            .await
            .expect("backdate reservation");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a request and decodes the JSON body; empty bodies become `Null`.
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response is json")
        };
        (status, value)
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.json(method, uri, body, Some(&self.admin_token)).await
    }

    pub async fn as_customer(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.json(method, uri, body, Some(&self.customer_token)).await
    }

    /// Places a pix order for the customer and returns the order payload.
    pub async fn place_order(&self, lines: &[(Uuid, i32)]) -> Value {
        let items: Vec<Value> = lines
            .iter()
            .map(|(id, quantity)| serde_json::json!({ "product_id": id, "quantity": quantity }))
            .collect();
        let (status, body) = self
            .as_customer(
                Method::POST,
                "/api/v1/orders",
                Some(serde_json::json!({ "items": items, "payment_method": "pix" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "order creation failed: {}", body);
        body["data"].clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}
