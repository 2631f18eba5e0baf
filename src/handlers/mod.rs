pub mod auth;
pub mod catalog;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    accounts::AccountService,
    catalog::CatalogService,
    coupons::CouponService,
    expiry::ExpiryService,
    order_status::OrderStatusService,
    orders::OrderService,
    payments::{PaymentGateway, PaymentService},
    StoreSettings,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<AccountService>,
    pub catalog: Arc<CatalogService>,
    pub coupons: Arc<CouponService>,
    pub expiry: Arc<ExpiryService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        gateway: Arc<dyn PaymentGateway>,
        settings: StoreSettings,
    ) -> Self {
        let expiry = Arc::new(ExpiryService::new(db_pool.clone(), event_sender.clone()));

        Self {
            accounts: Arc::new(AccountService::new(db_pool.clone())),
            catalog: Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone())),
            coupons: Arc::new(CouponService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                expiry.clone(),
                settings,
            )),
            order_status: Arc::new(OrderStatusService::new(
                db_pool.clone(),
                event_sender.clone(),
                expiry.clone(),
            )),
            payments: Arc::new(PaymentService::new(
                db_pool,
                event_sender,
                gateway,
                expiry.clone(),
            )),
            expiry,
        }
    }
}
