//! Database entities (sea-orm)

pub mod category;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod payment;
pub mod product;
pub mod user;

pub use order::{OrderStatus, PaymentMethod};
pub use payment::PaymentStatus;
pub use user::UserRole;
