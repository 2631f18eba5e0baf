//! Storefront API library
//!
//! Catalog, checkout with stock reservation, payments, and the in-store
//! pickup lifecycle for an electronics shop.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod cart;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService, ROLE_ADMIN};
use crate::services::{payments::PaymentGateway, StoreSettings};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires services and the token issuer from configuration.
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: Option<Arc<events::EventSender>>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            gateway,
            StoreSettings::from(&config),
        );
        Self {
            db,
            config,
            event_sender,
            services,
            auth,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{auth as account, catalog, coupons, orders, payments};

    let public = Router::new()
        .route("/auth/register", post(account::register))
        .route("/auth/login", post(account::login))
        .route("/auth/refresh", post(account::refresh))
        .route("/categories", get(catalog::list_categories));

    // Anonymous shoppers browse; staff tokens also reveal inactive products.
    let storefront = Router::new()
        .route("/products", get(catalog::list_products))
        .route("/products/:id", get(catalog::get_product))
        .with_optional_auth();

    let customer = Router::new()
        .route("/auth/logout", post(account::logout))
        .route(
            "/auth/profile",
            get(account::get_profile).put(account::update_profile),
        )
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/my_orders", get(orders::my_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/status_history", get(orders::status_history))
        .route(
            "/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/payments/:id", get(payments::get_payment))
        .route(
            "/payments/:id/simulate_approval",
            post(payments::simulate_approval),
        )
        .route("/coupons/validate", post(coupons::validate_coupon))
        .with_auth();

    let staff = Router::new()
        .route("/categories", post(catalog::create_category))
        .route("/categories/:id", axum::routing::delete(catalog::delete_category))
        .route("/products", post(catalog::create_product))
        .route(
            "/products/:id",
            axum::routing::put(catalog::update_product).delete(catalog::delete_product),
        )
        .route(
            "/products/:id/toggle_active",
            post(catalog::toggle_product_active),
        )
        .route("/orders/:id/update_status", post(orders::update_status))
        .route("/orders/:id/verify_pickup", post(orders::verify_pickup))
        .route("/orders/:id/manual_release", post(orders::manual_release))
        .route("/orders/:id/auto_process", post(orders::auto_process))
        .route(
            "/coupons",
            get(coupons::list_coupons).post(coupons::create_coupon),
        )
        .route(
            "/coupons/:id",
            get(coupons::get_coupon)
                .put(coupons::update_coupon)
                .delete(coupons::delete_coupon),
        )
        .route(
            "/coupons/:id/toggle_active",
            post(coupons::toggle_coupon_active),
        )
        .with_role(ROLE_ADMIN);

    Router::new()
        .merge(public)
        .merge(storefront)
        .merge(customer)
        .merge(staff)
}

/// Full HTTP surface: API, health, metrics and docs, with request id,
/// tracing, compression and auth injection. CORS and timeouts are left to
/// the binary since they depend on deployment.
pub fn app_router(state: AppState) -> Router {
    let auth = state.auth.clone();
    let db = state.db.clone();

    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .nest("/health", health::health_routes(db))
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            auth,
            auth::auth_service_layer,
        ))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
